//! Engine search and configuration parameters.

use serde::{Deserialize, Serialize};
use uci::{EngineCommand, GoOptions};

/// Search parameters and engine options for one analysis.
///
/// `threads`, `hash_mb`, `skill_level` and `contempt` are sent as
/// `setoption` commands once, during the handshake. `depth`,
/// `time_limit_ms` and `multipv` shape each `go` command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Search depth in plies, used when no time limit is set.
    pub depth: u32,
    /// Per-move time budget in milliseconds. Takes precedence over `depth`.
    pub time_limit_ms: Option<u64>,
    /// Number of principal variations to request.
    pub multipv: u32,
    /// Engine search threads.
    pub threads: u32,
    /// Transposition table size in MB.
    pub hash_mb: u32,
    /// Engine skill level (0-20).
    pub skill_level: u32,
    /// Contempt factor.
    pub contempt: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            depth: 15,
            time_limit_ms: None,
            multipv: 1,
            threads: 4,
            hash_mb: 128,
            skill_level: 20,
            contempt: 0,
        }
    }
}

impl EngineSettings {
    /// The `setoption` commands sent once after `uciok`.
    pub fn option_commands(&self) -> Vec<EngineCommand> {
        vec![
            EngineCommand::set_option("Threads", self.threads),
            EngineCommand::set_option("Hash", self.hash_mb),
            EngineCommand::set_option("Skill Level", self.skill_level),
            EngineCommand::set_option("Contempt", self.contempt),
        ]
    }

    /// The `go` command for one search: time-bounded when a time limit is
    /// set, depth-bounded otherwise.
    pub fn go_command(&self) -> EngineCommand {
        let opts = match self.time_limit_ms {
            Some(ms) if ms > 0 => GoOptions::movetime(ms),
            _ => GoOptions::depth(self.depth),
        };
        EngineCommand::Go(opts.with_multipv(self.multipv))
    }
}
