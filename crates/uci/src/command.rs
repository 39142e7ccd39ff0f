//! Commands sent from the analysing client to the engine.

use std::fmt;

use crate::UciError;

/// Commands the client writes to the engine's stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Switch the engine to UCI mode.
    Uci,
    /// Configure an engine parameter.
    SetOption { name: String, value: String },
    /// Readiness probe, answered by `readyok`.
    IsReady,
    /// Set up the position to search. `None` means the standard start position.
    Position { fen: Option<String> },
    /// Start searching.
    Go(GoOptions),
    /// Stop the current search as soon as possible.
    Stop,
    /// Exit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search to this depth.
    pub depth: Option<u32>,
    /// Search for exactly this time in milliseconds.
    pub movetime: Option<u64>,
    /// Number of principal variations to report.
    pub multipv: Option<u32>,
}

impl GoOptions {
    /// Depth-bounded search.
    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    /// Time-bounded search.
    pub fn movetime(ms: u64) -> Self {
        Self {
            movetime: Some(ms),
            ..Self::default()
        }
    }

    /// Request `lines` principal variations. Values of 0 or 1 leave the suffix off.
    pub fn with_multipv(mut self, lines: u32) -> Self {
        self.multipv = (lines > 1).then_some(lines);
        self
    }
}

impl EngineCommand {
    /// Shorthand for a `setoption` command.
    pub fn set_option(name: &str, value: impl ToString) -> Self {
        EngineCommand::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Shorthand for a `position fen` command.
    pub fn position_fen(fen: &str) -> Self {
        EngineCommand::Position {
            fen: Some(fen.to_string()),
        }
    }

    /// Format the command as a single protocol line (without newline).
    pub fn to_uci(&self) -> String {
        self.to_string()
    }

    /// Parse a command line as an engine would receive it.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut parts = input.split_whitespace();

        let cmd = parts.next().unwrap_or("");

        match cmd {
            "uci" => Ok(EngineCommand::Uci),
            "isready" => Ok(EngineCommand::IsReady),
            "stop" => Ok(EngineCommand::Stop),
            "quit" => Ok(EngineCommand::Quit),
            "setoption" => Self::parse_setoption(parts),
            "position" => Self::parse_position(parts),
            "go" => Ok(Self::parse_go(parts)),
            "" => Ok(EngineCommand::Unknown(String::new())),
            _ => Ok(EngineCommand::Unknown(input.to_string())),
        }
    }

    fn parse_setoption<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let parts: Vec<&str> = parts.collect();
        if parts.first() != Some(&"name") {
            return Err(UciError::ParseError(
                "setoption without 'name'".to_string(),
            ));
        }

        // Option names may contain spaces ("Skill Level"), so split on the `value` keyword.
        let value_idx = parts.iter().position(|&p| p == "value");
        let name_end = value_idx.unwrap_or(parts.len());
        let name = parts[1..name_end].join(" ");
        if name.is_empty() {
            return Err(UciError::ParseError("setoption with empty name".to_string()));
        }
        let value = value_idx
            .map(|idx| parts[idx + 1..].join(" "))
            .unwrap_or_default();

        Ok(EngineCommand::SetOption { name, value })
    }

    fn parse_position<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        match parts.next() {
            Some("startpos") => Ok(EngineCommand::Position { fen: None }),
            Some("fen") => {
                let fen_parts: Vec<&str> = parts.take_while(|&p| p != "moves").collect();
                if fen_parts.is_empty() {
                    return Err(UciError::ParseError("Empty FEN".to_string()));
                }
                Ok(EngineCommand::Position {
                    fen: Some(fen_parts.join(" ")),
                })
            }
            Some(other) => Err(UciError::ParseError(format!(
                "Expected 'startpos' or 'fen', got '{}'",
                other
            ))),
            None => Err(UciError::ParseError(
                "Expected 'startpos' or 'fen'".to_string(),
            )),
        }
    }

    fn parse_go<'a>(parts: impl Iterator<Item = &'a str>) -> Self {
        let mut opts = GoOptions::default();
        let parts: Vec<&str> = parts.collect();
        let mut i = 0;

        while i < parts.len() {
            match parts[i] {
                "movetime" => {
                    i += 1;
                    if i < parts.len() {
                        opts.movetime = parts[i].parse().ok();
                    }
                }
                "depth" => {
                    i += 1;
                    if i < parts.len() {
                        opts.depth = parts[i].parse().ok();
                    }
                }
                "multipv" => {
                    i += 1;
                    if i < parts.len() {
                        opts.multipv = parts[i].parse().ok();
                    }
                }
                _ => {}
            }
            i += 1;
        }

        EngineCommand::Go(opts)
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Uci => write!(f, "uci"),
            EngineCommand::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            EngineCommand::IsReady => write!(f, "isready"),
            EngineCommand::Position { fen: Some(fen) } => write!(f, "position fen {}", fen),
            EngineCommand::Position { fen: None } => write!(f, "position startpos"),
            EngineCommand::Go(opts) => {
                write!(f, "go")?;
                // A time budget takes precedence over depth.
                match (opts.movetime, opts.depth) {
                    (Some(ms), _) => write!(f, " movetime {}", ms)?,
                    (None, Some(depth)) => write!(f, " depth {}", depth)?,
                    (None, None) => {}
                }
                if let Some(lines) = opts.multipv {
                    write!(f, " multipv {}", lines)?;
                }
                Ok(())
            }
            EngineCommand::Stop => write!(f, "stop"),
            EngineCommand::Quit => write!(f, "quit"),
            EngineCommand::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}
