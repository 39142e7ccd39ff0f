//! Chess Analyzer
//!
//! Analyses PGN games or single positions with a pool of UCI engines and
//! prints the result as JSON.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chess_analysis::{
    pgn, AnalysisRequest, AnalysisService, AnalyzerConfig, CancelToken, EngineSettings,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chess-analyzer")]
#[command(about = "Engine-backed chess game analysis")]
struct Cli {
    /// Configuration file (defaults to analyzer.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse every move of a PGN game
    Game {
        /// PGN file to analyse
        pgn_file: PathBuf,
        /// Identifier reported with the analysis
        #[arg(long)]
        game_id: Option<String>,
        /// Analyse at most this many moves (0 = all)
        #[arg(short, long, default_value = "0")]
        max_moves: usize,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Analyse a single FEN position
    Position {
        fen: String,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Check a PGN file and print its headers and moves without analysing
    Validate { pgn_file: PathBuf },
}

/// Overrides for the configured search limits.
#[derive(Args, Debug, Default)]
struct SearchArgs {
    /// Search depth in plies
    #[arg(short, long)]
    depth: Option<u32>,
    /// Time per position in milliseconds (takes precedence over depth)
    #[arg(long)]
    movetime: Option<u64>,
    /// Number of principal variations
    #[arg(long)]
    multipv: Option<u32>,
}

impl SearchArgs {
    fn apply(&self, defaults: &EngineSettings) -> EngineSettings {
        let mut settings = defaults.clone();
        if let Some(depth) = self.depth {
            settings.depth = depth;
        }
        if let Some(ms) = self.movetime {
            settings.time_limit_ms = Some(ms);
        }
        if let Some(lines) = self.multipv {
            settings.multipv = lines;
        }
        settings
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_pgn(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling analysis");
            token.cancel();
        }
    });
}

async fn run(
    service: &AnalysisService,
    command: Commands,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Game {
            pgn_file,
            game_id,
            max_moves,
            search,
        } => {
            let request = AnalysisRequest {
                game_id,
                pgn: read_pgn(&pgn_file)?,
                settings: Some(search.apply(service.defaults())),
                max_moves,
            };
            let analysis = service.analyze_game(&request, cancel).await?;
            print_json(&*analysis)
        }
        Commands::Position { fen, search } => {
            let settings = search.apply(service.defaults());
            let result = service.analyze_position(&fen, Some(&settings), cancel).await?;
            print_json(&result)
        }
        Commands::Validate { pgn_file } => validate(&pgn_file),
    }
}

fn validate(pgn_file: &Path) -> anyhow::Result<()> {
    let text = read_pgn(pgn_file)?;
    pgn::validate(&text)?;
    let game = pgn::parse(&text)?;
    print_json(&game.to_game_info())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Validation needs no engines.
    if let Commands::Validate { pgn_file } = &cli.command {
        return validate(pgn_file);
    }

    let config =
        AnalyzerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        engine = %config.engine.path.display(),
        engines = config.engine.max_engines,
        "starting analysis engines"
    );
    let service = AnalysisService::from_config(&config)
        .await
        .context("Failed to start analysis engines")?;

    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    let outcome = run(&service, cli.command, &cancel).await;
    if let Err(e) = service.close().await {
        warn!(error = %e, "engine shutdown reported errors");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_game_command_with_limits() {
        let cli = Cli::try_parse_from([
            "chess-analyzer",
            "--config",
            "custom.toml",
            "game",
            "game.pgn",
            "--depth",
            "18",
            "-m",
            "20",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Game {
                pgn_file,
                max_moves,
                search,
                game_id,
            } => {
                assert_eq!(pgn_file, PathBuf::from("game.pgn"));
                assert_eq!(max_moves, 20);
                assert_eq!(search.depth, Some(18));
                assert_eq!(game_id, None);
            }
            _ => panic!("expected game command"),
        }
    }

    #[test]
    fn test_cli_parses_position_command() {
        let cli = Cli::try_parse_from([
            "chess-analyzer",
            "position",
            "8/8/8/8/8/8/8/K6k w - - 0 1",
            "--movetime",
            "500",
            "--multipv",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Position { fen, search } => {
                assert_eq!(fen, "8/8/8/8/8/8/8/K6k w - - 0 1");
                assert_eq!(search.movetime, Some(500));
                assert_eq!(search.multipv, Some(3));
            }
            _ => panic!("expected position command"),
        }
    }

    #[test]
    fn test_search_args_override_only_given_fields() {
        let defaults = EngineSettings::default();
        let args = SearchArgs {
            depth: Some(9),
            ..SearchArgs::default()
        };

        let settings = args.apply(&defaults);
        assert_eq!(settings.depth, 9);
        assert_eq!(settings.time_limit_ms, defaults.time_limit_ms);
        assert_eq!(settings.multipv, defaults.multipv);
        assert_eq!(settings.threads, defaults.threads);
    }
}
