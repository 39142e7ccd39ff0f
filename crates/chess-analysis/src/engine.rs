//! UCI engine client for position analysis.
//!
//! An [`EngineClient`] owns exactly one engine process (or any other byte
//! stream speaking UCI) and moves through an explicit lifecycle:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready <-> Analyzing
//!        \______________\____________\__________\______> Closed
//! ```
//!
//! `Closed` is terminal. A client only reports `Ready` after the engine has
//! answered the `isready` probe with `readyok`.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};
use uci::{EngineCommand, EngineInfo, EngineMessage};

use crate::cancel::CancelToken;
use crate::channel::LineChannel;
use crate::evaluation::Evaluation;
use crate::settings::EngineSettings;

/// Time allowed for `uci`/`uciok` plus option setup and `isready`/`readyok`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for one search to produce `bestmove`.
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for the engine to answer `stop` (or exit after `quit`).
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to spawn the engine process.
    #[error("Failed to spawn engine: {0}")]
    Spawn(#[source] io::Error),
    /// Engine executable was not found at the specified path.
    #[error("Engine not found at path: {0}")]
    NotFound(String),
    /// The UCI handshake did not complete.
    #[error("Engine initialization failed: {0}")]
    Initialization(String),
    /// An analysis was requested while the engine was not idle.
    #[error("Engine is not ready (state: {0})")]
    NotReady(EngineState),
    /// No `bestmove` arrived before the deadline.
    #[error("Analysis timed out after {0:?}")]
    AnalysisTimeout(Duration),
    /// The caller cancelled the analysis.
    #[error("Analysis cancelled")]
    Cancelled,
    /// The stream to the engine failed mid-conversation.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The engine process could not be terminated.
    #[error("Failed to terminate engine: {0}")]
    Close(#[source] io::Error),
}

/// Lifecycle state of an engine client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Analyzing,
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Analyzing => "analyzing",
            EngineState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Deadlines applied by an [`EngineClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub handshake: Duration,
    pub analysis: Duration,
    pub stop_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: HANDSHAKE_TIMEOUT,
            analysis: ANALYSIS_TIMEOUT,
            stop_grace: STOP_GRACE,
        }
    }
}

/// One ranked line from a MultiPV search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvLine {
    /// 1-based rank reported by `multipv`.
    pub rank: u32,
    /// Evaluation in pawns.
    pub evaluation: f64,
    /// Depth at which this line was last reported.
    pub depth: u32,
    /// Moves of the line in UCI notation.
    pub moves: Vec<String>,
}

/// Result of analyzing a chess position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The analysed position in FEN.
    pub position: String,
    /// The best move found (in UCI notation, e.g., "e2e4").
    pub best_move: Option<String>,
    /// The reply the engine expects.
    pub ponder: Option<String>,
    /// Evaluation in pawns, relative to the side to move.
    pub evaluation: f64,
    /// The raw engine score behind `evaluation`.
    pub score: Option<Evaluation>,
    /// The search depth reached.
    pub depth: u32,
    /// The number of nodes searched.
    pub nodes: u64,
    /// Search time reported by the engine in milliseconds.
    pub time_ms: u64,
    /// The most recently reported principal variation.
    pub pv: Vec<String>,
    /// The `multipv` index `pv` belongs to.
    pub multipv: u32,
    /// Latest report for every ranked line, ordered by rank.
    pub lines: Vec<PvLine>,
}

/// Folds `info` lines into the eventual [`AnalysisResult`].
#[derive(Debug, Default)]
struct SearchAccumulator {
    score: Option<Evaluation>,
    depth: u32,
    nodes: u64,
    time_ms: u64,
    pv: Vec<String>,
    multipv: u32,
    lines: BTreeMap<u32, PvLine>,
}

impl SearchAccumulator {
    fn apply(&mut self, info: &EngineInfo) {
        if let Some(depth) = info.depth {
            self.depth = depth;
        }
        if let Some(nodes) = info.nodes {
            self.nodes = nodes;
        }
        if let Some(time) = info.time {
            self.time_ms = time;
        }
        if let Some(score) = info.score {
            self.score = Some(score.into());
        }
        if info.pv.is_empty() {
            return;
        }

        let rank = info.multipv.unwrap_or(1);
        self.pv = info.pv.clone();
        self.multipv = rank;
        let evaluation = info
            .score
            .map(|s| Evaluation::from(s).to_pawns())
            .or_else(|| self.lines.get(&rank).map(|l| l.evaluation))
            .unwrap_or_default();
        self.lines.insert(
            rank,
            PvLine {
                rank,
                evaluation,
                depth: self.depth,
                moves: info.pv.clone(),
            },
        );
    }

    fn finish(self, position: &str, best_move: Option<String>, ponder: Option<String>) -> AnalysisResult {
        AnalysisResult {
            position: position.to_string(),
            best_move,
            ponder,
            evaluation: self.score.map(Evaluation::to_pawns).unwrap_or_default(),
            score: self.score,
            depth: self.depth,
            nodes: self.nodes,
            time_ms: self.time_ms,
            pv: self.pv,
            multipv: self.multipv.max(1),
            lines: self.lines.into_values().collect(),
        }
    }
}

/// Client for one UCI-compatible analysis engine like Stockfish.
pub struct EngineClient {
    channel: LineChannel,
    /// Present when the client spawned the engine itself.
    child: Option<Child>,
    state: EngineState,
    /// The engine's name (reported via UCI id).
    name: String,
    timeouts: Timeouts,
}

impl EngineClient {
    /// Spawn the engine at `path` and complete the UCI handshake.
    ///
    /// # Errors
    ///
    /// - `EngineError::NotFound` if the executable does not exist
    /// - `EngineError::Spawn` if the process fails to start
    /// - `EngineError::Initialization` if the handshake fails or times out;
    ///   the process is terminated in that case
    pub async fn start(
        path: impl AsRef<Path>,
        settings: &EngineSettings,
        timeouts: Timeouts,
    ) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => EngineError::NotFound(path.display().to_string()),
                _ => EngineError::Spawn(e),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill().await;
                return Err(EngineError::Initialization(
                    "engine stdio was not captured".to_string(),
                ));
            }
        };

        debug!(path = %path.display(), pid = ?child.id(), "spawned engine");
        let mut client = Self::unstarted(LineChannel::new(stdout, stdin), Some(child), timeouts);
        client.handshake(settings).await?;
        Ok(client)
    }

    /// Complete the UCI handshake over an already-connected stream pair.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        settings: &EngineSettings,
        timeouts: Timeouts,
    ) -> Result<Self, EngineError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut client = Self::unstarted(LineChannel::new(reader, writer), None, timeouts);
        client.handshake(settings).await?;
        Ok(client)
    }

    fn unstarted(channel: LineChannel, child: Option<Child>, timeouts: Timeouts) -> Self {
        Self {
            channel,
            child,
            state: EngineState::Uninitialized,
            name: String::new(),
            timeouts,
        }
    }

    /// Returns the engine's name as reported via UCI protocol.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// True when the client can accept another analysis.
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    async fn handshake(&mut self, settings: &EngineSettings) -> Result<(), EngineError> {
        self.state = EngineState::Initializing;
        let deadline = Instant::now() + self.timeouts.handshake;

        if let Err(e) = self.run_handshake(settings, deadline).await {
            warn!(error = %e, "engine handshake failed");
            let _ = self.close().await;
            return Err(e);
        }

        if self.name.is_empty() {
            self.name = "Unknown Engine".to_string();
        }
        self.state = EngineState::Ready;
        info!(engine = %self.name, "engine ready");
        Ok(())
    }

    async fn run_handshake(
        &mut self,
        settings: &EngineSettings,
        deadline: Instant,
    ) -> Result<(), EngineError> {
        self.send_init(&EngineCommand::Uci).await?;
        loop {
            let line = self.read_handshake_line(deadline, "uciok").await?;
            if line.contains("uciok") {
                break;
            }
            if let EngineMessage::Id { name: Some(name), .. } = EngineMessage::parse(&line) {
                self.name = name;
            }
        }

        for command in settings.option_commands() {
            self.send_init(&command).await?;
        }

        self.send_init(&EngineCommand::IsReady).await?;
        loop {
            let line = self.read_handshake_line(deadline, "readyok").await?;
            if line.contains("readyok") {
                return Ok(());
            }
        }
    }

    async fn send_init(&mut self, command: &EngineCommand) -> Result<(), EngineError> {
        self.channel
            .send(command)
            .await
            .map_err(|e| EngineError::Initialization(format!("failed to send '{}': {}", command, e)))
    }

    async fn read_handshake_line(
        &mut self,
        deadline: Instant,
        expecting: &str,
    ) -> Result<String, EngineError> {
        match timeout_at(deadline, self.channel.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => Err(EngineError::Initialization(format!(
                "engine exited while waiting for {}",
                expecting
            ))),
            Ok(Err(e)) => Err(EngineError::Initialization(format!(
                "read failed while waiting for {}: {}",
                expecting, e
            ))),
            Err(_) => Err(EngineError::Initialization(format!(
                "timed out waiting for {}",
                expecting
            ))),
        }
    }

    /// Analyze a position given in FEN notation.
    ///
    /// Sends `position fen` and a `go` command built from `settings`, then
    /// folds `info` lines until `bestmove`. The wait is bounded by the
    /// analysis timeout and by `cancel`.
    ///
    /// After a timeout or cancellation the engine is told to `stop`; if it
    /// acknowledges in time the client is `Ready` again, otherwise it is
    /// closed. After a stream failure the client is always closed.
    pub async fn analyze_position(
        &mut self,
        fen: &str,
        settings: &EngineSettings,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, EngineError> {
        if self.state != EngineState::Ready {
            return Err(EngineError::NotReady(self.state));
        }

        self.state = EngineState::Analyzing;
        match self.search(fen, settings, cancel).await {
            Ok(result) => {
                self.state = EngineState::Ready;
                Ok(result)
            }
            Err(e @ (EngineError::AnalysisTimeout(_) | EngineError::Cancelled)) => {
                self.interrupt().await;
                Err(e)
            }
            Err(e) => {
                warn!(engine = %self.name, error = %e, "closing engine after stream failure");
                let _ = self.close().await;
                Err(e)
            }
        }
    }

    async fn search(
        &mut self,
        fen: &str,
        settings: &EngineSettings,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, EngineError> {
        let limit = self.timeouts.analysis;
        let deadline = Instant::now() + limit;

        self.send_search(&EngineCommand::position_fen(fen)).await?;
        self.send_search(&settings.go_command()).await?;

        let mut acc = SearchAccumulator::default();
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = sleep_until(deadline) => return Err(EngineError::AnalysisTimeout(limit)),
                line = self.channel.next_line() => line,
            };

            match line {
                Ok(Some(line)) => match EngineMessage::parse(&line) {
                    EngineMessage::Info(info) => acc.apply(&info),
                    EngineMessage::BestMove { mv, ponder } => {
                        return Ok(acc.finish(fen, mv, ponder));
                    }
                    _ => {}
                },
                Ok(None) => {
                    return Err(EngineError::Protocol(
                        "engine closed its output during analysis".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(EngineError::Protocol(format!(
                        "read failed during analysis: {}",
                        e
                    )));
                }
            }
        }
    }

    async fn send_search(&mut self, command: &EngineCommand) -> Result<(), EngineError> {
        self.channel
            .send(command)
            .await
            .map_err(|e| EngineError::Protocol(format!("failed to send '{}': {}", command, e)))
    }

    /// Stop an interrupted search and drain up to its `bestmove`.
    async fn interrupt(&mut self) {
        let channel = &mut self.channel;
        let drained = async {
            channel.send(&EngineCommand::Stop).await.ok()?;
            loop {
                let line = channel.next_line().await.ok()??;
                if let EngineMessage::BestMove { .. } = EngineMessage::parse(&line) {
                    return Some(());
                }
            }
        };

        match timeout(self.timeouts.stop_grace, drained).await {
            Ok(Some(())) => {
                debug!(engine = %self.name, "search stopped, engine reusable");
                self.state = EngineState::Ready;
            }
            _ => {
                warn!(engine = %self.name, "engine did not acknowledge stop, closing");
                let _ = self.close().await;
            }
        }
    }

    /// Shut the engine down. Idempotent.
    ///
    /// Sends `quit`, closes the engine's stdin, and reaps the process,
    /// killing it if it does not exit within the stop grace period.
    pub async fn close(&mut self) -> Result<(), EngineError> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        self.state = EngineState::Closed;

        let grace = self.timeouts.stop_grace;
        let _ = timeout(grace, self.channel.send(&EngineCommand::Quit)).await;
        let _ = timeout(grace, self.channel.shutdown()).await;

        if let Some(mut child) = self.child.take() {
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "engine exited"),
                _ => child.kill().await.map_err(EngineError::Close)?,
            }
        }

        debug!(engine = %self.name, "engine closed");
        Ok(())
    }
}

impl fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClient")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("pid", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}
