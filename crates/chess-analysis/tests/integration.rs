//! Integration tests against a real engine.
//!
//! These tests require Stockfish to be installed and available in PATH.
//! Run with: `cargo test -p chess-analysis --test integration -- --ignored`

use chess_analysis::{
    AnalysisConfig, AnalysisRequest, AnalysisService, CancelToken, EngineClient, EngineError,
    EnginePool, EngineSettings, ProcessLauncher, Timeouts,
};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Check if Stockfish is available in PATH.
fn stockfish_available() -> bool {
    std::process::Command::new("stockfish")
        .arg("quit")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

fn quick_settings() -> EngineSettings {
    EngineSettings {
        depth: 10,
        threads: 1,
        hash_mb: 16,
        ..EngineSettings::default()
    }
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_engine_basic_analysis() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let settings = quick_settings();
    let mut engine = EngineClient::start("stockfish", &settings, Timeouts::default())
        .await
        .expect("Failed to start Stockfish");

    assert!(
        engine.name().to_lowercase().contains("stockfish"),
        "Engine name should contain 'Stockfish', got: {}",
        engine.name()
    );

    let result = engine
        .analyze_position(START_FEN, &settings, &CancelToken::new())
        .await
        .expect("Failed to analyze starting position");

    assert!(result.best_move.is_some(), "Best move should be reported");
    assert!(
        result.depth >= 10,
        "Search depth should be at least 10, got: {}",
        result.depth
    );
    assert!(engine.is_ready());

    engine.close().await.expect("Failed to close engine");
}

#[tokio::test]
async fn test_missing_engine_is_reported() {
    let err = EngineClient::start(
        "/nonexistent/stockfish-binary",
        &EngineSettings::default(),
        Timeouts::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)), "got: {err}");
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_scholars_mate_game_analysis() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let pgn = r#"[Event "Scholar's Mate"]
[Site "?"]
[Date "2024.01.01"]
[Round "1"]
[White "White"]
[Black "Black"]
[Result "1-0"]

1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0"#;

    let launcher = ProcessLauncher::new("stockfish", quick_settings());
    let pool = EnginePool::new(launcher, 2)
        .await
        .expect("Failed to start engine pool");
    let service = AnalysisService::new(pool, quick_settings(), &AnalysisConfig::default());

    let analysis = service
        .analyze_game(&AnalysisRequest::new(pgn), &CancelToken::new())
        .await
        .expect("Failed to analyze game");

    assert_eq!(analysis.moves.len(), 7);
    assert_eq!(analysis.accuracy.white.moves, 4);
    assert_eq!(analysis.accuracy.black.moves, 3);
    for mv in &analysis.moves {
        assert!((0.0..=100.0).contains(&mv.accuracy));
    }

    service.close().await.expect("Failed to close service");
}
