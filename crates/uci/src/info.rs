//! Parsing of the `info` lines an engine reports while searching.

use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance, from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

/// Search information reported by the engine.
///
/// Every field is optional: engines omit whatever they like, and a field
/// that fails to parse is simply left unset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    /// 1-based index of the principal variation this line describes.
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    /// Time spent in milliseconds.
    pub time: Option<u64>,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
    /// Free text after `string`.
    pub string: Option<String>,
}

/// Keywords that end a `pv` move list.
const KEYWORDS: &[&str] = &[
    "depth",
    "seldepth",
    "multipv",
    "score",
    "nodes",
    "nps",
    "time",
    "pv",
    "currmove",
    "currmovenumber",
    "hashfull",
    "tbhits",
    "bmc",
    "string",
];

type Tokens<'a> = Peekable<SplitWhitespace<'a>>;

fn value<T: FromStr>(tokens: &mut Tokens<'_>) -> Option<T> {
    tokens.next()?.parse().ok()
}

fn score(tokens: &mut Tokens<'_>) -> Option<Score> {
    let kind = *tokens.peek()?;
    match kind {
        "cp" | "mate" => {
            tokens.next();
            let n = value(tokens)?;
            Some(if kind == "cp" { Score::Cp(n) } else { Score::Mate(n) })
        }
        _ => None,
    }
}

impl EngineInfo {
    /// Parse a UCI info line.
    ///
    /// Returns `None` only when the line is not an `info` line at all.
    /// Unknown tokens are skipped and a value that fails to parse leaves
    /// its field unset.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.next() != Some("info") {
            return None;
        }

        let mut info = EngineInfo::default();
        while let Some(token) = tokens.next() {
            match token {
                "depth" => info.depth = value(&mut tokens),
                "seldepth" => info.seldepth = value(&mut tokens),
                "multipv" => info.multipv = value(&mut tokens),
                "nodes" => info.nodes = value(&mut tokens),
                "nps" => info.nps = value(&mut tokens),
                "time" => info.time = value(&mut tokens),
                "score" => {
                    if let Some(s) = score(&mut tokens) {
                        info.score = Some(s);
                    }
                }
                "pv" => {
                    while let Some(mv) = tokens.next_if(|t| !KEYWORDS.contains(t)) {
                        info.pv.push(mv.to_string());
                    }
                }
                "string" => {
                    info.string = Some(tokens.by_ref().collect::<Vec<_>>().join(" "));
                }
                _ => {}
            }
        }

        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_info() {
        let line = "info depth 12 seldepth 18 multipv 1 score cp 30 nodes 125000 nps 500000 time 250 pv e2e4 e7e5 g1f3";
        let info = EngineInfo::parse(line).unwrap();

        assert_eq!(info.depth, Some(12));
        assert_eq!(info.seldepth, Some(18));
        assert_eq!(info.multipv, Some(1));
        assert_eq!(info.score, Some(Score::Cp(30)));
        assert_eq!(info.nodes, Some(125000));
        assert_eq!(info.nps, Some(500000));
        assert_eq!(info.time, Some(250));
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn parse_mate_score() {
        let info = EngineInfo::parse("info depth 20 score mate -3 pv e2e4").unwrap();
        assert_eq!(info.score, Some(Score::Mate(-3)));
    }

    #[test]
    fn parse_bounded_score() {
        let info = EngineInfo::parse("info depth 9 score cp 41 lowerbound nodes 900").unwrap();
        assert_eq!(info.score, Some(Score::Cp(41)));
        assert_eq!(info.nodes, Some(900));
    }

    #[test]
    fn parse_tolerates_garbage_values() {
        let info = EngineInfo::parse("info depth x nodes 42 score cp ?? time 7").unwrap();

        assert_eq!(info.depth, None);
        assert_eq!(info.nodes, Some(42));
        assert_eq!(info.score, None);
        assert_eq!(info.time, Some(7));
    }

    #[test]
    fn parse_pv_stops_at_keyword() {
        let info = EngineInfo::parse("info depth 5 pv e2e4 e7e5 bmc 0.5").unwrap();
        assert_eq!(info.pv, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn parse_string_info() {
        let info = EngineInfo::parse("info string NNUE evaluation enabled").unwrap();
        assert_eq!(info.string.as_deref(), Some("NNUE evaluation enabled"));
        assert_eq!(info.depth, None);
    }

    #[test]
    fn parse_rejects_non_info_line() {
        assert!(EngineInfo::parse("bestmove e2e4").is_none());
        assert!(EngineInfo::parse("information depth 3").is_none());
    }

    #[test]
    fn score_serializes() {
        let json = serde_json::to_string(&Score::Mate(2)).unwrap();
        assert_eq!(json, r#"{"Mate":2}"#);
    }
}
