//! Chess game analysis backed by a pool of UCI engines.
//!
//! The crate parses PGN transcripts, analyses each position with a pooled
//! engine process, classifies every move by accuracy, and caches finished
//! game analyses.
//!
//! # Overview
//!
//! - [`EngineClient`] - Async session with one UCI engine process
//! - [`EnginePool`] - Fixed set of engines with blocking acquire
//! - [`pgn`] - PGN validation and parsing
//! - [`MoveQuality`] / [`GameAccuracy`] - Move classification and statistics
//! - [`AnalysisService`] - Whole-game analysis with result caching
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{AnalysisRequest, AnalysisService, AnalyzerConfig, CancelToken};
//!
//! let config = AnalyzerConfig::load(None)?;
//! let service = AnalysisService::from_config(&config).await?;
//! let analysis = service
//!     .analyze_game(&AnalysisRequest::new(pgn), &CancelToken::new())
//!     .await?;
//! println!("Average accuracy: {:.1}%", analysis.accuracy.average_accuracy);
//! service.close().await?;
//! ```

pub mod analyzer;
pub mod cache;
pub mod cancel;
pub mod channel;
pub mod config;
pub mod engine;
pub mod evaluation;
pub mod pgn;
pub mod pool;
pub mod quality;
pub mod settings;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalysisError, AnalysisRequest, AnalysisService, ServiceStatus};
pub use cache::{BoundedCache, EvictionKind, EvictionPolicy};
pub use cancel::CancelToken;
pub use config::{AnalysisConfig, AnalyzerConfig, ConfigError, EngineConfig};
pub use engine::{AnalysisResult, EngineClient, EngineError, EngineState, PvLine, Timeouts};
pub use evaluation::Evaluation;
pub use pgn::{GamePhase, ParsedGame, ParsedMove, PgnError, PositionSource, Side};
pub use pool::{EngineLauncher, EnginePool, PoolError, PoolStatus, PooledEngine, ProcessLauncher};
pub use quality::{GameAccuracy, GameAnalysis, MoveAnalysis, MoveQuality, PlayerStats};
pub use settings::EngineSettings;
