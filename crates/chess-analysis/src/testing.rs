//! Scripted in-memory UCI engine for the client's unit tests.
//!
//! Covers handshake faults, hung searches and dropped streams. Pool-level
//! behaviour is exercised by the launcher in `tests/common`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use uci::{EngineCommand, GoOptions, Score};

use crate::engine::{EngineClient, EngineError, Timeouts};
use crate::settings::EngineSettings;

/// How the fake engine behaves.
#[derive(Debug, Clone)]
pub(crate) struct FakeScript {
    pub name: &'static str,
    pub answer_uci: bool,
    pub answer_isready: bool,
    /// Score reported by the n-th search, cycling.
    pub scores: Vec<Score>,
    /// Extra lines written before the real search output.
    pub noise: Vec<String>,
    pub think: Duration,
    /// Never finish a search until told to `stop`.
    pub hang: bool,
    pub honor_stop: bool,
    /// Drop the stream as soon as a search starts.
    pub exit_on_go: bool,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            name: "FakeFish 1.0",
            answer_uci: true,
            answer_isready: true,
            scores: vec![Score::Cp(20)],
            noise: Vec::new(),
            think: Duration::ZERO,
            hang: false,
            honor_stop: true,
            exit_on_go: false,
        }
    }
}

impl FakeScript {
    /// One shallow line, any noise, then the final depth's line and `bestmove`.
    fn search_output(&self, search: usize, opts: &GoOptions) -> Vec<String> {
        let depth = opts.depth.unwrap_or(10);
        let score = format_score(self.scores[search % self.scores.len()]);

        let mut out = vec![format!("info depth 1 score {score} nodes 20 time 1 pv e2e4")];
        out.extend(self.noise.iter().cloned());
        out.push(format!(
            "info depth {depth} seldepth {depth} score {score} nodes {} nps 100000 time {} pv e2e4 e7e5 g1f3",
            depth * 1000,
            depth * 10,
        ));
        out.push("bestmove e2e4 ponder e7e5".to_string());
        out
    }
}

fn format_score(score: Score) -> String {
    match score {
        Score::Cp(cp) => format!("cp {}", cp),
        Score::Mate(n) => format!("mate {}", n),
    }
}

/// What the fake engine observed.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeHandle {
    commands: Arc<Mutex<Vec<String>>>,
    searches: Arc<AtomicUsize>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FakeHandle {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Wait for the fake engine to exit.
    pub async fn finished(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn record(&self, line: &str) {
        self.commands.lock().unwrap().push(line.trim().to_string());
    }
}

async fn run(script: FakeScript, stream: DuplexStream, handle: FakeHandle) {
    let (reader, mut writer) = split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        handle.record(&line);
        let reply = match EngineCommand::parse(&line) {
            Ok(EngineCommand::Uci) if script.answer_uci => vec![
                format!("id name {}", script.name),
                "id author Test Suite".to_string(),
                "option name Hash type spin default 16 min 1 max 33554432".to_string(),
                "uciok".to_string(),
            ],
            Ok(EngineCommand::IsReady) if script.answer_isready => vec!["readyok".to_string()],
            Ok(EngineCommand::Go(opts)) => {
                let search = handle.searches.fetch_add(1, Ordering::SeqCst);
                if script.exit_on_go {
                    return;
                }
                if script.hang {
                    loop {
                        match lines.next_line().await {
                            Ok(Some(l)) => {
                                handle.record(&l);
                                match l.trim() {
                                    "stop" => break,
                                    "quit" => return,
                                    _ => {}
                                }
                            }
                            _ => return,
                        }
                    }
                    if !script.honor_stop {
                        continue;
                    }
                    vec!["bestmove e2e4".to_string()]
                } else {
                    if !script.think.is_zero() {
                        tokio::time::sleep(script.think).await;
                    }
                    script.search_output(search, &opts)
                }
            }
            Ok(EngineCommand::Quit) => return,
            _ => Vec::new(),
        };

        for out in reply {
            if writer.write_all(format!("{}\n", out).as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Start a fake engine and connect a client to it.
pub(crate) async fn connect_fake(
    script: FakeScript,
    settings: &EngineSettings,
    timeouts: Timeouts,
) -> Result<(EngineClient, FakeHandle), EngineError> {
    let (ours, theirs) = duplex(64 * 1024);
    let handle = FakeHandle::default();
    let task = tokio::spawn(run(script, theirs, handle.clone()));
    *handle.task.lock().unwrap() = Some(task);

    let (reader, writer) = split(ours);
    let client = EngineClient::connect(reader, writer, settings, timeouts).await?;
    Ok((client, handle))
}
