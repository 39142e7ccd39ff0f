//! Analyzer configuration.
//!
//! Values come from a TOML file (every field optional) and are then
//! overridden by environment variables. An environment value that does
//! not parse is ignored and the previous value kept.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::EvictionKind;
use crate::engine::Timeouts;
use crate::settings::EngineSettings;

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is outside its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine executable, pool size and default search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine executable. Defaults to "stockfish" (assumes it's in PATH).
    pub path: PathBuf,
    /// Number of engine processes in the pool.
    pub max_engines: usize,
    pub handshake_timeout_ms: u64,
    pub analysis_timeout_ms: u64,
    pub stop_grace_ms: u64,
    /// Settings used when a request does not bring its own.
    pub defaults: EngineSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            path: PathBuf::from("stockfish"),
            max_engines: 4,
            handshake_timeout_ms: timeouts.handshake.as_millis() as u64,
            analysis_timeout_ms: timeouts.analysis.as_millis() as u64,
            stop_grace_ms: timeouts.stop_grace.as_millis() as u64,
            defaults: EngineSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            handshake: Duration::from_millis(self.handshake_timeout_ms),
            analysis: Duration::from_millis(self.analysis_timeout_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

/// Result cache and per-game limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_cache_size: usize,
    /// Minutes a cached analysis stays valid; 0 keeps entries until evicted.
    pub cache_expiration_minutes: u64,
    /// Upper bound on moves analysed per game; 0 means no bound.
    pub max_moves_per_game: usize,
    pub enable_caching: bool,
    pub eviction: EvictionKind,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 1000,
            cache_expiration_minutes: 60,
            max_moves_per_game: 100,
            enable_caching: true,
            eviction: EvictionKind::Lru,
        }
    }
}

impl AnalysisConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_expiration_minutes > 0)
            .then(|| Duration::from_secs(self.cache_expiration_minutes * 60))
    }
}

/// Top-level configuration, `analyzer.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
}

impl AnalyzerConfig {
    /// Returns the default configuration file path.
    pub fn config_path() -> PathBuf {
        PathBuf::from("analyzer.toml")
    }

    /// Load configuration from `path`, or from [`Self::config_path`] when
    /// `None`, then apply environment overrides and validate.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Empty values count as unset.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let engine = &mut self.engine;
        let defaults = &mut engine.defaults;
        let analysis = &mut self.analysis;

        if let Some(path) = lookup("STOCKFISH_PATH") {
            engine.path = PathBuf::from(path);
        }
        override_parsed(&lookup, "STOCKFISH_MAX_ENGINES", &mut engine.max_engines);
        override_parsed(&lookup, "STOCKFISH_DEFAULT_DEPTH", &mut defaults.depth);
        let mut time_limit = defaults.time_limit_ms.unwrap_or(0);
        override_parsed(&lookup, "STOCKFISH_DEFAULT_TIME_LIMIT", &mut time_limit);
        defaults.time_limit_ms = (time_limit > 0).then_some(time_limit);
        override_parsed(&lookup, "STOCKFISH_DEFAULT_THREADS", &mut defaults.threads);
        override_parsed(&lookup, "STOCKFISH_DEFAULT_HASH_SIZE", &mut defaults.hash_mb);
        override_parsed(&lookup, "STOCKFISH_DEFAULT_SKILL_LEVEL", &mut defaults.skill_level);
        override_parsed(&lookup, "STOCKFISH_DEFAULT_CONTEMPT", &mut defaults.contempt);

        override_parsed(&lookup, "ANALYSIS_MAX_CACHE_SIZE", &mut analysis.max_cache_size);
        override_parsed(&lookup, "ANALYSIS_CACHE_EXPIRATION", &mut analysis.cache_expiration_minutes);
        override_parsed(&lookup, "ANALYSIS_MAX_MOVES_PER_GAME", &mut analysis.max_moves_per_game);
        if let Some(raw) = lookup("ANALYSIS_ENABLE_CACHING") {
            match parse_bool(&raw) {
                Some(enabled) => analysis.enable_caching = enabled,
                None => warn!(key = "ANALYSIS_ENABLE_CACHING", value = %raw, "ignoring unparseable override"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let defaults = &self.engine.defaults;
        if self.engine.max_engines == 0 {
            return Err(ConfigError::Invalid("max_engines must be at least 1".to_string()));
        }
        if defaults.skill_level > 20 {
            return Err(ConfigError::Invalid(format!(
                "skill_level must be between 0 and 20, got {}",
                defaults.skill_level
            )));
        }
        if defaults.threads == 0 || defaults.hash_mb == 0 || defaults.multipv == 0 {
            return Err(ConfigError::Invalid(
                "threads, hash_mb and multipv must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
