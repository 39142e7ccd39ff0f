//! In-memory UCI engines for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess_analysis::{EngineClient, EngineError, EngineLauncher, EngineSettings, Timeouts};
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

pub const ENGINE_NAME: &str = "FakeFish 1.0";

const LINES: [&str; 3] = ["e2e4 e7e5 g1f3", "d2d4 d7d5 c2c4", "g1f3 g8f6 c2c4"];

pub const SCHOLARS_MATE: &str = r#"[Event "Casual Game"]
[Site "https://example.org/game/7"]
[Date "2024.03.15"]
[Round "1"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]
[GameId "scholar-7"]

1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0"#;

pub fn test_timeouts() -> Timeouts {
    Timeouts {
        handshake: Duration::from_secs(2),
        analysis: Duration::from_secs(5),
        stop_grace: Duration::from_millis(200),
    }
}

#[derive(Default)]
struct Shared {
    think: Duration,
    launches: AtomicUsize,
    searches: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    crash_next_search: AtomicBool,
    refuse_launches: AtomicBool,
}

/// Launches scripted engines that answer every search after `think`.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    shared: Arc<Shared>,
}

impl FakeLauncher {
    pub fn new(think: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                think,
                ..Shared::default()
            }),
        }
    }

    pub fn launches(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    /// Searches started across every engine this launcher produced.
    pub fn searches(&self) -> usize {
        self.shared.searches.load(Ordering::SeqCst)
    }

    /// Most searches that were ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    /// The next engine to receive `go` drops its stream instead of answering.
    pub fn crash_next_search(&self) {
        self.shared.crash_next_search.store(true, Ordering::SeqCst);
    }

    pub fn refuse_launches(&self) {
        self.shared.refuse_launches.store(true, Ordering::SeqCst);
    }
}

impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<EngineClient, EngineError> {
        if self.shared.refuse_launches.load(Ordering::SeqCst) {
            return Err(EngineError::Initialization("launch refused".to_string()));
        }
        self.shared.launches.fetch_add(1, Ordering::SeqCst);

        let (ours, theirs) = duplex(64 * 1024);
        tokio::spawn(run(Arc::clone(&self.shared), theirs));
        let (reader, writer) = split(ours);
        EngineClient::connect(reader, writer, &EngineSettings::default(), test_timeouts()).await
    }
}

fn go_arg(line: &str, name: &str) -> Option<u32> {
    let mut tokens = line.split_whitespace();
    tokens.find(|t| *t == name)?;
    tokens.next()?.parse().ok()
}

async fn run(shared: Arc<Shared>, stream: DuplexStream) {
    let (reader, mut writer) = split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        let reply: Vec<String> = if line == "uci" {
            vec![
                format!("id name {}", ENGINE_NAME),
                "id author Test Suite".to_string(),
                "uciok".to_string(),
            ]
        } else if line == "isready" {
            vec!["readyok".to_string()]
        } else if line == "quit" {
            return;
        } else if line.starts_with("go") {
            shared.searches.fetch_add(1, Ordering::SeqCst);
            if shared.crash_next_search.swap(false, Ordering::SeqCst) {
                return;
            }

            let active = shared.active.fetch_add(1, Ordering::SeqCst) + 1;
            shared.peak.fetch_max(active, Ordering::SeqCst);

            let thinking = tokio::time::sleep(shared.think);
            tokio::pin!(thinking);
            let finished = loop {
                tokio::select! {
                    _ = &mut thinking => break true,
                    next = lines.next_line() => match next {
                        Ok(Some(l)) if l.trim() == "stop" => break false,
                        Ok(Some(_)) => continue,
                        _ => {
                            shared.active.fetch_sub(1, Ordering::SeqCst);
                            return;
                        }
                    },
                }
            };
            shared.active.fetch_sub(1, Ordering::SeqCst);

            if finished {
                let depth = go_arg(&line, "depth").unwrap_or(10);
                let multipv = go_arg(&line, "multipv").unwrap_or(1).max(1);
                let mut out: Vec<String> = (1..=multipv)
                    .map(|rank| {
                        format!(
                            "info depth {d} seldepth {d} multipv {rank} score cp {} nodes {} nps 100000 time {} pv {}",
                            25 - 30 * (rank as i32 - 1),
                            depth * 1000,
                            depth * 10,
                            LINES[(rank as usize - 1) % LINES.len()],
                            d = depth,
                        )
                    })
                    .collect();
                out.push("bestmove e2e4 ponder e7e5".to_string());
                out
            } else {
                vec!["bestmove e2e4".to_string()]
            }
        } else {
            Vec::new()
        };

        for out in reply {
            if writer.write_all(format!("{}\n", out).as_bytes()).await.is_err() {
                return;
            }
        }
    }
}
