//! Move quality classification and game-level aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::AnalysisResult;
use crate::pgn::{GamePhase, ParsedMove, Side};
use crate::settings::EngineSettings;

/// Accuracy below this is a blunder.
pub const BLUNDER_BELOW: f64 = 50.0;
/// Accuracy below this (and not a blunder) is a mistake.
pub const MISTAKE_BELOW: f64 = 80.0;
/// Accuracy below this (and not a mistake) is an inaccuracy.
pub const INACCURACY_BELOW: f64 = 90.0;
/// Accuracy at or above this counts as a best move.
pub const BEST_FROM: f64 = 95.0;

/// Accuracy percentage for a move given the evaluation after it.
///
/// Winning evaluations cost 10 points per pawn, losing ones 15, and the
/// result is clamped to `0..=100`. This is a heuristic: it does not compare
/// against the evaluation of the best available move.
pub fn move_accuracy(evaluation: f64) -> f64 {
    let raw = if evaluation >= 0.0 {
        100.0 - evaluation * 10.0
    } else {
        100.0 + evaluation * 15.0
    };
    raw.clamp(0.0, 100.0)
}

/// Classification of move quality based on accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveQuality {
    /// Accuracy of 95 or more
    Best,
    /// Between an inaccuracy and a best move
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveQuality {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy < BLUNDER_BELOW {
            MoveQuality::Blunder
        } else if accuracy < MISTAKE_BELOW {
            MoveQuality::Mistake
        } else if accuracy < INACCURACY_BELOW {
            MoveQuality::Inaccuracy
        } else if accuracy >= BEST_FROM {
            MoveQuality::Best
        } else {
            MoveQuality::Good
        }
    }

    pub fn is_blunder(self) -> bool {
        self == MoveQuality::Blunder
    }

    pub fn is_mistake(self) -> bool {
        self == MoveQuality::Mistake
    }

    pub fn is_inaccuracy(self) -> bool {
        self == MoveQuality::Inaccuracy
    }

    pub fn is_best(self) -> bool {
        self == MoveQuality::Best
    }
}

/// Another candidate move the engine considered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAlternative {
    #[serde(rename = "move")]
    pub mv: String,
    pub evaluation: f64,
    pub depth: u32,
}

/// Analysis result for a single move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAnalysis {
    /// 1-based position of the move in the game
    pub ply: usize,
    /// Move number as written in the transcript
    pub move_number: u32,
    pub side: Side,
    /// The move that was played, as written
    pub san: String,
    /// Evaluation in pawns
    pub evaluation: f64,
    pub accuracy: f64,
    pub quality: MoveQuality,
    /// The best move according to the engine
    pub best_move: Option<String>,
    pub alternatives: Vec<MoveAlternative>,
    pub depth: u32,
    pub nodes: u64,
    pub time_ms: u64,
}

impl MoveAnalysis {
    /// Score a move from the engine's analysis of its position.
    ///
    /// The side is taken from ply parity (odd plies are White's).
    pub fn from_result(ply: usize, mv: &ParsedMove, result: &AnalysisResult) -> Self {
        let accuracy = move_accuracy(result.evaluation);
        let alternatives = result
            .lines
            .iter()
            .filter(|line| line.moves.first() != result.best_move.as_ref())
            .filter_map(|line| {
                line.moves.first().map(|first| MoveAlternative {
                    mv: first.clone(),
                    evaluation: line.evaluation,
                    depth: line.depth,
                })
            })
            .collect();

        Self {
            ply,
            move_number: mv.number,
            side: Side::from_ply(ply),
            san: mv.san.clone(),
            evaluation: result.evaluation,
            accuracy,
            quality: MoveQuality::from_accuracy(accuracy),
            best_move: result.best_move.clone(),
            alternatives,
            depth: result.depth,
            nodes: result.nodes,
            time_ms: result.time_ms,
        }
    }
}

/// Statistics for one side's performance in a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Moves analysed
    pub moves: usize,
    pub best_moves: usize,
    pub inaccuracies: usize,
    pub mistakes: usize,
    pub blunders: usize,
    /// Mean accuracy, 0 when the side has no analysed moves
    pub accuracy: f64,
}

impl PlayerStats {
    fn from_moves<'a>(moves: impl Iterator<Item = &'a MoveAnalysis>) -> Self {
        let mut stats = PlayerStats::default();
        let mut accuracy_sum = 0.0;
        for m in moves {
            stats.moves += 1;
            accuracy_sum += m.accuracy;
            match m.quality {
                MoveQuality::Blunder => stats.blunders += 1,
                MoveQuality::Mistake => stats.mistakes += 1,
                MoveQuality::Inaccuracy => stats.inaccuracies += 1,
                MoveQuality::Best => stats.best_moves += 1,
                MoveQuality::Good => {}
            }
        }
        if stats.moves > 0 {
            stats.accuracy = accuracy_sum / stats.moves as f64;
        }
        stats
    }
}

/// Accuracy metrics for the whole game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameAccuracy {
    pub white: PlayerStats,
    pub black: PlayerStats,
    /// Mean accuracy over every analysed move
    pub average_accuracy: f64,
    pub blunders: usize,
    pub mistakes: usize,
    pub inaccuracies: usize,
    pub best_moves: usize,
}

impl GameAccuracy {
    pub fn from_moves(moves: &[MoveAnalysis]) -> Self {
        let white = PlayerStats::from_moves(moves.iter().filter(|m| m.side == Side::White));
        let black = PlayerStats::from_moves(moves.iter().filter(|m| m.side == Side::Black));

        let average_accuracy = if moves.is_empty() {
            0.0
        } else {
            moves.iter().map(|m| m.accuracy).sum::<f64>() / moves.len() as f64
        };

        GameAccuracy {
            average_accuracy,
            blunders: white.blunders + black.blunders,
            mistakes: white.mistakes + black.mistakes,
            inaccuracies: white.inaccuracies + black.inaccuracies,
            best_moves: white.best_moves + black.best_moves,
            white,
            black,
        }
    }
}

/// How hard the game was to play accurately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn from_accuracy(average_accuracy: f64) -> Self {
        if average_accuracy >= 90.0 {
            Complexity::Low
        } else if average_accuracy >= 75.0 {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }
}

/// High-level summary of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Moves analysed
    pub total_moves: usize,
    /// Mean search depth reached
    pub analysis_depth: u32,
    /// Engine search time summed over all moves, in ms
    pub total_time_ms: u64,
    pub nodes_searched: u64,
    pub phase: GamePhase,
    /// `None` when no move was analysed
    pub complexity: Option<Complexity>,
    pub recommendations: Vec<String>,
}

impl AnalysisSummary {
    pub fn from_moves(moves: &[MoveAnalysis], accuracy: &GameAccuracy) -> Self {
        let total_moves = moves.len();
        let phase = GamePhase::from_move_count(total_moves);
        let analysis_depth = if total_moves == 0 {
            0
        } else {
            (moves.iter().map(|m| u64::from(m.depth)).sum::<u64>() / total_moves as u64) as u32
        };

        let (complexity, recommendations) = if total_moves == 0 {
            (None, Vec::new())
        } else {
            (
                Some(Complexity::from_accuracy(accuracy.average_accuracy)),
                recommendations(accuracy, phase),
            )
        };

        AnalysisSummary {
            total_moves,
            analysis_depth,
            total_time_ms: moves.iter().map(|m| m.time_ms).sum(),
            nodes_searched: moves.iter().map(|m| m.nodes).sum(),
            phase,
            complexity,
            recommendations,
        }
    }
}

/// Threshold-triggered advice for the player.
pub fn recommendations(accuracy: &GameAccuracy, phase: GamePhase) -> Vec<String> {
    let mut out = Vec::new();

    if accuracy.blunders > 5 {
        out.push("Consider spending more time on tactical calculations to reduce blunders".to_string());
    }
    if accuracy.mistakes > 10 {
        out.push("Focus on positional understanding to minimize mistakes".to_string());
    }
    if accuracy.average_accuracy < 80.0 {
        out.push("Overall game accuracy could be improved with more careful move selection".to_string());
    }
    if phase == GamePhase::Opening && accuracy.average_accuracy < 85.0 {
        out.push("Study opening theory to improve early game play".to_string());
    }

    out
}

/// Complete analysis of a chess game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAnalysis {
    /// Request id, else the game's `GameId` or `Link` header
    pub game_id: Option<String>,
    pub pgn: String,
    pub analyzed_at: DateTime<Utc>,
    /// Wall-clock time the analysis took
    pub duration_ms: u64,
    /// Engine name reported during the handshake
    pub engine_name: String,
    pub settings: EngineSettings,
    pub moves: Vec<MoveAnalysis>,
    /// Evaluation after the last analysed move
    pub game_evaluation: f64,
    pub accuracy: GameAccuracy,
    pub summary: AnalysisSummary,
}
