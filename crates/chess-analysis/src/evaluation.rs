//! Chess position evaluation types.

use serde::{Deserialize, Serialize};
use uci::Score;

/// Magnitude a forced mate maps to when expressed in pawns.
pub const MATE_SCORE: f64 = 1000.0;

/// Represents a chess position evaluation.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found). Both are relative to the
/// side to move, exactly as the engine reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    /// Centipawn evaluation.
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

impl Evaluation {
    /// Convert to pawns.
    ///
    /// Mates map to `±(1000 - distance)` so that a shorter mate orders above
    /// a longer one and every mate orders above any centipawn score.
    pub fn to_pawns(self) -> f64 {
        match self {
            Evaluation::Centipawns(cp) => f64::from(cp) / 100.0,
            Evaluation::Mate(n) if n > 0 => MATE_SCORE - f64::from(n),
            Evaluation::Mate(n) => -MATE_SCORE - f64::from(n),
        }
    }

    /// True for forced-mate evaluations.
    pub fn is_mate(self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }
}

impl From<Score> for Evaluation {
    fn from(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }
}
