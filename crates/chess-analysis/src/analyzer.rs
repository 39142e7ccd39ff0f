//! Whole-game analysis on top of the engine pool.
//!
//! [`AnalysisService`] validates and parses a PGN, analyses every position
//! with a pooled engine, classifies each move, and caches the finished
//! [`GameAnalysis`] keyed by the PGN text and the search limits.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{BoundedCache, EvictionKind};
use crate::cancel::CancelToken;
use crate::config::{AnalysisConfig, AnalyzerConfig};
use crate::engine::{AnalysisResult, EngineError};
use crate::pgn::{self, ParsedGame, PgnError, PlaceholderPositions, PositionSource};
use crate::pool::{EngineLauncher, EnginePool, PoolError, PooledEngine, ProcessLauncher};
use crate::quality::{AnalysisSummary, GameAccuracy, GameAnalysis, MoveAnalysis};
use crate::settings::EngineSettings;

/// Errors that abort an analysis request.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Engine error: {0}")]
    Engine(#[source] EngineError),
    #[error("Engine pool error: {0}")]
    Pool(#[from] PoolError),
    /// The PGN was rejected before any engine work started.
    #[error("Invalid game: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Analysis cancelled")]
    Cancelled,
}

impl From<EngineError> for AnalysisError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => AnalysisError::Cancelled,
            other => AnalysisError::Engine(other),
        }
    }
}

impl From<PgnError> for AnalysisError {
    fn from(e: PgnError) -> Self {
        match e {
            PgnError::Validation(msg) => AnalysisError::Validation(msg),
            PgnError::NotFound(msg) => AnalysisError::NotFound(msg),
        }
    }
}

/// A game to analyse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub game_id: Option<String>,
    pub pgn: String,
    /// Search limits for this request. Handshake-time options (threads,
    /// hash, skill, contempt) only take effect through the pool's launcher.
    #[serde(default)]
    pub settings: Option<EngineSettings>,
    /// Analyse at most this many moves; 0 means all of them.
    #[serde(default)]
    pub max_moves: usize,
}

impl AnalysisRequest {
    pub fn new(pgn: impl Into<String>) -> Self {
        Self {
            pgn: pgn.into(),
            ..Self::default()
        }
    }
}

/// Identity of a cached game analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pgn: String,
    depth: u32,
    time_limit_ms: Option<u64>,
    multipv: u32,
    max_moves: usize,
}

impl CacheKey {
    fn new(request: &AnalysisRequest, settings: &EngineSettings) -> Self {
        Self {
            pgn: request.pgn.clone(),
            depth: settings.depth,
            time_limit_ms: settings.time_limit_ms,
            multipv: settings.multipv,
            max_moves: request.max_moves,
        }
    }
}

/// Pool and cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub total_engines: usize,
    pub available_engines: usize,
    pub cache_size: usize,
    pub max_cache_size: usize,
}

/// Number of moves to analyse given the request, the configured cap, and
/// the moves the game actually has. Zero means "no bound" for the first two.
fn move_limit(requested: usize, cap: usize, available: usize) -> usize {
    let mut limit = available;
    if requested > 0 {
        limit = limit.min(requested);
    }
    if cap > 0 {
        limit = limit.min(cap);
    }
    limit
}

/// Analyses games and single positions with a shared engine pool.
pub struct AnalysisService<L: EngineLauncher = ProcessLauncher> {
    pool: EnginePool<L>,
    cache: Option<BoundedCache<CacheKey, Arc<GameAnalysis>, EvictionKind>>,
    defaults: EngineSettings,
    max_cache_size: usize,
    max_moves_per_game: usize,
    positions: Box<dyn PositionSource>,
}

impl AnalysisService<ProcessLauncher> {
    /// Start the engine pool described by `config` and wrap it.
    pub async fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let launcher = ProcessLauncher {
            path: config.engine.path.clone(),
            settings: config.engine.defaults.clone(),
            timeouts: config.engine.timeouts(),
        };
        let pool = EnginePool::new(launcher, config.engine.max_engines).await?;
        Ok(Self::new(pool, config.engine.defaults.clone(), &config.analysis))
    }
}

impl<L: EngineLauncher> AnalysisService<L> {
    pub fn new(pool: EnginePool<L>, defaults: EngineSettings, config: &AnalysisConfig) -> Self {
        let cache = config.enable_caching.then(|| {
            BoundedCache::with_policy(config.max_cache_size, config.eviction)
                .with_ttl(config.cache_ttl())
        });
        Self {
            pool,
            cache,
            defaults,
            max_cache_size: config.max_cache_size,
            max_moves_per_game: config.max_moves_per_game,
            positions: Box::new(PlaceholderPositions),
        }
    }

    /// Use `positions` to derive the FEN analysed for each move.
    pub fn with_positions(mut self, positions: impl PositionSource + 'static) -> Self {
        self.positions = Box::new(positions);
        self
    }

    /// Settings used when a request brings none.
    pub fn defaults(&self) -> &EngineSettings {
        &self.defaults
    }

    pub fn pool(&self) -> &EnginePool<L> {
        &self.pool
    }

    /// Analyse every move of a game, or return the cached analysis.
    ///
    /// Moves whose analysis fails are logged and left out. Only cancellation,
    /// an invalid PGN, or a closed pool abort the whole request; aborted
    /// requests are never cached.
    pub async fn analyze_game(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
    ) -> Result<Arc<GameAnalysis>, AnalysisError> {
        let settings = request
            .settings
            .clone()
            .unwrap_or_else(|| self.defaults.clone());
        let key = CacheKey::new(request, &settings);

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!(game_id = ?hit.game_id, "analysis cache hit");
            return Ok(hit);
        }

        pgn::validate(&request.pgn)?;
        let mut game = pgn::parse(&request.pgn)?;
        self.positions.fill_positions(&mut game);

        let started = Instant::now();
        let analyzed_at = Utc::now();
        let limit = move_limit(request.max_moves, self.max_moves_per_game, game.len());
        info!(
            moves = game.len(),
            limit,
            depth = settings.depth,
            "analysing game"
        );

        let mut moves = Vec::with_capacity(limit);
        for (index, mv) in game.moves.iter().take(limit).enumerate() {
            let ply = index + 1;
            let mut engine = self.checkout(cancel).await?;
            let outcome = engine.analyze_position(&mv.fen, &settings, cancel).await;
            engine.release();

            match outcome {
                Ok(result) => moves.push(MoveAnalysis::from_result(ply, mv, &result)),
                Err(EngineError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => warn!(ply, san = %mv.san, error = %e, "move analysis failed, skipping"),
            }
        }

        let accuracy = GameAccuracy::from_moves(&moves);
        let summary = AnalysisSummary::from_moves(&moves, &accuracy);
        let analysis = Arc::new(GameAnalysis {
            game_id: game_id(request, &game),
            pgn: request.pgn.clone(),
            analyzed_at,
            duration_ms: started.elapsed().as_millis() as u64,
            engine_name: self.pool.engine_name().to_string(),
            settings,
            game_evaluation: moves.last().map_or(0.0, |m| m.evaluation),
            moves,
            accuracy,
            summary,
        });

        info!(
            analysed = analysis.moves.len(),
            average_accuracy = analysis.accuracy.average_accuracy,
            duration_ms = analysis.duration_ms,
            "game analysis complete"
        );

        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::clone(&analysis));
        }
        Ok(analysis)
    }

    /// Analyse one position with a pooled engine.
    pub async fn analyze_position(
        &self,
        fen: &str,
        settings: Option<&EngineSettings>,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let settings = settings.unwrap_or(&self.defaults);
        let mut engine = self.checkout(cancel).await?;
        let result = engine.analyze_position(fen, settings, cancel).await;
        engine.release();
        Ok(result?)
    }

    async fn checkout(&self, cancel: &CancelToken) -> Result<PooledEngine<L>, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
            engine = self.pool.acquire() => Ok(engine?),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        let pool = self.pool.status();
        ServiceStatus {
            total_engines: pool.size,
            available_engines: pool.available,
            cache_size: self.cache.as_ref().map_or(0, |c| c.len()),
            max_cache_size: self.max_cache_size,
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("analysis cache cleared");
        }
    }

    /// Shut down every pooled engine.
    pub async fn close(&self) -> Result<(), AnalysisError> {
        self.pool.close().await?;
        Ok(())
    }
}

fn game_id(request: &AnalysisRequest, game: &ParsedGame) -> Option<String> {
    request
        .game_id
        .clone()
        .or_else(|| game.header("gameid").map(str::to_string))
        .or_else(|| game.header("link").map(str::to_string))
}
