//! PGN (Portable Game Notation) parsing.
//!
//! Turns a game transcript into headers and an ordered move list. Moves
//! are kept as written; no board is tracked, so a move list is accepted
//! whether or not the moves are legal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Headers every game must carry to pass [`validate`].
pub const REQUIRED_HEADERS: [&str; 7] = ["event", "site", "date", "round", "white", "black", "result"];

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([A-Za-z]+)\s+"([^"]*)"\]"#).expect("The header regex should be valid")
});

static SAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?$|^O-O(-O)?[+#]?$")
        .expect("The SAN regex should be valid")
});

static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(\.+)(.*)$").expect("The move number regex should be valid"));

// Brace comment (possibly unterminated), NAG, stray closing brace, or word.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^}]*)(\})?|\$(\d+)|(\})|([^\s{}$]+)").expect("The token regex should be valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgnError {
    /// The transcript is malformed.
    #[error("Invalid PGN: {0}")]
    Validation(String),
    /// A requested move does not exist in the game.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// The side that played a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Side that plays the given 1-based ply: odd plies are White's.
    pub fn from_ply(ply: usize) -> Self {
        if ply % 2 == 1 {
            Side::White
        } else {
            Side::Black
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// Coarse game phase derived from a move count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

impl GamePhase {
    /// Up to 20 moves is the opening, up to 40 the middlegame.
    pub fn from_move_count(moves: usize) -> Self {
        match moves {
            0..=20 => GamePhase::Opening,
            21..=40 => GamePhase::Middlegame,
            _ => GamePhase::Endgame,
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamePhase::Opening => f.write_str("opening"),
            GamePhase::Middlegame => f.write_str("middlegame"),
            GamePhase::Endgame => f.write_str("endgame"),
        }
    }
}

/// One move of a parsed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMove {
    /// Move number as written in the transcript.
    pub number: u32,
    /// 1-based position of the move in the game.
    pub ply: usize,
    pub side: Side,
    /// Move text as written, e.g. `Nf3` or `exd8=Q+`.
    pub san: String,
    /// Position the move is analysed in. Empty until a [`PositionSource`] fills it.
    pub fen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Numeric annotation glyph, e.g. `$1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nag: Option<String>,
}

/// A parsed game transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedGame {
    /// Tag pairs with lowercased keys.
    pub headers: BTreeMap<String, String>,
    pub moves: Vec<ParsedMove>,
    pub result: String,
    /// The transcript this game was parsed from.
    pub pgn: String,
    pub move_count: usize,
    pub phase: GamePhase,
}

impl ParsedGame {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of moves (plies) in the game.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Find the move `side` played at move `number`.
    pub fn move_at(&self, number: u32, side: Side) -> Result<&ParsedMove, PgnError> {
        self.moves
            .iter()
            .find(|m| m.number == number && m.side == side)
            .ok_or_else(|| {
                PgnError::NotFound(format!("move not found at position {} for {}", number, side))
            })
    }

    /// Summarise the game the way a game-data service describes it.
    pub fn to_game_info(&self) -> GameInfo {
        let mut moves: Vec<GameMove> = Vec::new();
        for mv in &self.moves {
            let merge = matches!(moves.last(), Some(last) if last.move_number == mv.number && mv.side == Side::Black && last.black_move.is_none());
            if !merge {
                moves.push(GameMove {
                    move_number: mv.number,
                    white_move: None,
                    black_move: None,
                    fen: mv.fen.clone(),
                });
            }
            if let Some(entry) = moves.last_mut() {
                match mv.side {
                    Side::White => entry.white_move = Some(mv.san.clone()),
                    Side::Black => entry.black_move = Some(mv.san.clone()),
                }
            }
        }

        let header = |name: &str| self.header(name).unwrap_or_default().to_string();
        GameInfo {
            pgn: self.pgn.clone(),
            result: self.result.clone(),
            tournament: header("event"),
            url: header("site"),
            date: self
                .header("date")
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y.%m.%d").ok()),
            time_control: header("timecontrol"),
            rules: header("rules"),
            white_player: header("white"),
            black_player: header("black"),
            moves,
        }
    }
}

/// Game summary derived from a [`ParsedGame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub pgn: String,
    pub result: String,
    pub tournament: String,
    pub url: String,
    pub date: Option<NaiveDate>,
    pub time_control: String,
    pub rules: String,
    pub white_player: String,
    pub black_player: String,
    pub moves: Vec<GameMove>,
}

/// A full move: White's move and Black's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMove {
    pub move_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_move: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_move: Option<String>,
    pub fen: String,
}

/// Supplies the position each move is analysed in.
pub trait PositionSource: Send + Sync {
    /// Fill `fen` for every move of `game`.
    fn fill_positions(&self, game: &mut ParsedGame);
}

/// The standard starting board with only the move clocks advanced.
///
/// Without a move-application component the true position after each move
/// is unknown; this reproduces the placeholder the analysis has always been
/// run against.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderPositions;

impl PlaceholderPositions {
    pub fn fen_for(index: usize) -> String {
        format!(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - {} {}",
            index,
            index / 2 + 1
        )
    }
}

impl PositionSource for PlaceholderPositions {
    fn fill_positions(&self, game: &mut ParsedGame) {
        for (index, mv) in game.moves.iter_mut().enumerate() {
            mv.fen = Self::fen_for(index);
        }
    }
}

/// True for standard algebraic notation, including castling, captures,
/// promotions, and check or mate suffixes.
pub fn is_valid_move(san: &str) -> bool {
    SAN_RE.is_match(san)
}

/// Split a transcript into its header section and movetext.
fn split_sections(text: &str) -> Result<(String, String), PgnError> {
    let text = text.replace("\r\n", "\n");
    let text = text.trim();
    if text.is_empty() {
        return Err(PgnError::Validation("empty PGN".to_string()));
    }

    match text.split_once("\n\n") {
        Some((headers, moves)) => Ok((headers.to_string(), moves.to_string())),
        None => Err(PgnError::Validation("missing moves section".to_string())),
    }
}

fn parse_headers(section: &str) -> BTreeMap<String, String> {
    HEADER_RE
        .captures_iter(section)
        .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].to_string()))
        .collect()
}

/// Check that a transcript has the required headers and a movetext.
pub fn validate(text: &str) -> Result<(), PgnError> {
    let (headers, moves) = split_sections(text)?;
    let headers = parse_headers(&headers);

    if let Some(missing) = REQUIRED_HEADERS.iter().find(|h| !headers.contains_key(**h)) {
        return Err(PgnError::Validation(format!(
            "missing required header: {}",
            missing
        )));
    }

    if moves.trim().is_empty() {
        return Err(PgnError::Validation("empty moves section".to_string()));
    }
    Ok(())
}

/// Parse a transcript into a [`ParsedGame`].
///
/// Brace comments, rest-of-line `;` comments and NAGs are recognised and
/// attached to the move they follow. A movetext line that cannot be
/// tokenized is skipped.
pub fn parse(text: &str) -> Result<ParsedGame, PgnError> {
    let (header_section, movetext) = split_sections(text)?;
    let headers = parse_headers(&header_section);

    let mut scanner = MoveScanner::default();
    for (lineno, line) in movetext.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match tokenize(line, scanner.open_comment.is_some()) {
            Ok(tokens) => scanner.apply(tokens),
            Err(reason) => debug!(line = lineno + 1, %reason, "skipping movetext line"),
        }
    }

    let result = movetext
        .split_whitespace()
        .last()
        .filter(|t| RESULTS.contains(t))
        .map(str::to_string)
        .or_else(|| headers.get("result").cloned())
        .unwrap_or_default();

    let moves = scanner.moves;
    Ok(ParsedGame {
        move_count: moves.len(),
        phase: GamePhase::from_move_count(moves.len()),
        headers,
        moves,
        result,
        pgn: text.to_string(),
    })
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    /// Brace comment text; `closed` is false when it runs past the line.
    Comment { text: &'a str, closed: bool },
    Nag(&'a str),
    Word(&'a str),
}

/// Cut a `;` comment, ignoring semicolons inside braces.
fn strip_line_comment(line: &str) -> &str {
    let mut depth = 0usize;
    for (i, c) in line.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize(line: &str, in_comment: bool) -> Result<Vec<Token<'_>>, String> {
    let mut tokens = Vec::new();
    let mut rest = line;

    if in_comment {
        match rest.find('}') {
            None => return Ok(vec![Token::Comment { text: rest.trim(), closed: false }]),
            Some(end) => {
                tokens.push(Token::Comment {
                    text: rest[..end].trim(),
                    closed: true,
                });
                rest = &rest[end + 1..];
            }
        }
    }

    for caps in TOKEN_RE.captures_iter(strip_line_comment(rest)) {
        if let Some(text) = caps.get(1) {
            tokens.push(Token::Comment {
                text: text.as_str().trim(),
                closed: caps.get(2).is_some(),
            });
        } else if let Some(nag) = caps.get(3) {
            tokens.push(Token::Nag(nag.as_str()));
        } else if caps.get(4).is_some() {
            return Err("unmatched '}'".to_string());
        } else if let Some(word) = caps.get(5) {
            tokens.push(Token::Word(word.as_str()));
        }
    }
    Ok(tokens)
}

/// Movetext state carried across lines.
#[derive(Debug, Default)]
struct MoveScanner {
    moves: Vec<ParsedMove>,
    number: u32,
    /// Moves seen since the last move number; even is White.
    index: u32,
    open_comment: Option<String>,
    /// Comment seen before any move, attached to the first one.
    leading_comment: Option<String>,
}

impl MoveScanner {
    fn apply(&mut self, tokens: Vec<Token<'_>>) {
        for token in tokens {
            match token {
                Token::Comment { text, closed } => {
                    let text = match self.open_comment.take() {
                        Some(mut open) if !text.is_empty() => {
                            open.push(' ');
                            open.push_str(text);
                            open
                        }
                        Some(open) => open,
                        None => text.to_string(),
                    };
                    if closed {
                        self.attach_comment(text);
                    } else {
                        self.open_comment = Some(text);
                    }
                }
                Token::Nag(n) => {
                    if let Some(last) = self.moves.last_mut() {
                        last.nag = Some(format!("${}", n));
                    }
                }
                Token::Word(word) => self.word(word),
            }
        }
    }

    fn attach_comment(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let slot = match self.moves.last_mut() {
            Some(last) => &mut last.comment,
            None => &mut self.leading_comment,
        };
        match slot {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&text);
            }
            None => *slot = Some(text),
        }
    }

    fn word(&mut self, word: &str) {
        if RESULTS.contains(&word) {
            return;
        }

        if let Some(caps) = MOVE_NUMBER_RE.captures(word) {
            if let Ok(number) = caps[1].parse() {
                self.number = number;
                // "12..." continues with Black's move.
                self.index = if caps[2].len() >= 3 { 1 } else { 0 };
            }
            let rest = caps.get(3).map_or("", |m| m.as_str());
            if !rest.is_empty() {
                self.push_move(rest);
            }
            return;
        }

        self.push_move(word);
    }

    fn push_move(&mut self, san: &str) {
        // Text before the first move number is not a move.
        if self.number == 0 {
            return;
        }
        let side = if self.index % 2 == 0 {
            Side::White
        } else {
            Side::Black
        };
        let comment = if self.moves.is_empty() {
            self.leading_comment.take()
        } else {
            None
        };
        self.moves.push(ParsedMove {
            number: self.number,
            ply: self.moves.len() + 1,
            side,
            san: san.to_string(),
            fen: String::new(),
            comment,
            nag: None,
        });
        self.index += 1;
    }
}
