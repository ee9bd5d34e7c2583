mod support;

use ice_age_operation::game::stage::{StageError, StageLoader};
use ice_age_operation::game::{FrameInput, GameSession, SessionOptions, Tile};
use reqwest::StatusCode;
use support::{ensure_server, BROKEN_STAGE_KEY, STAGE_KEY};

#[tokio::test]
async fn health_reports_ok() {
    let base_url = ensure_server();
    let body: serde_json::Value = reqwest::get(format!("{base_url}/health"))
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("health body is json");

    assert_eq!(body["status"], "ok");
    assert!(body["rooms"].is_number());
}

#[tokio::test]
async fn loader_fetches_served_stage() {
    let loader = StageLoader::new(ensure_server());
    let stage = loader.fetch(STAGE_KEY).await.expect("stage should load");

    assert_eq!((stage.rows(), stage.cols()), (3, 5));
    assert_eq!(stage.tile_size(), 40.0);
    assert_eq!(stage.events().len(), 1);
    assert_eq!(stage.tile_at(60.0, 60.0), Tile::Spawn);
    assert_eq!(stage.find_spawn(), (60.0, 60.0));
}

#[tokio::test]
async fn stage_route_status_codes() {
    assert_eq!(status(&format!("/stages/{STAGE_KEY}")).await, StatusCode::OK);
    assert_eq!(
        status("/stages/MISSING-99.json").await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(status("/stages/bad%20key").await, StatusCode::BAD_REQUEST);
    assert_eq!(
        status(&format!("/stages/{BROKEN_STAGE_KEY}.json")).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
}

async fn status(path: &str) -> StatusCode {
    reqwest::get(format!("{}{path}", ensure_server()))
        .await
        .expect("request should succeed")
        .status()
}

#[tokio::test]
async fn failed_loads_fall_back_to_empty_stage() {
    let loader = StageLoader::new(ensure_server());

    assert!(matches!(
        loader.fetch("MISSING-99").await,
        Err(StageError::Status(404))
    ));
    assert!(matches!(
        loader.fetch("../etc").await,
        Err(StageError::InvalidKey(_))
    ));
    assert!(loader.load_or_empty("MISSING-99").await.is_empty());
    assert!(loader.load_or_empty(BROKEN_STAGE_KEY).await.is_empty());
}

#[tokio::test]
async fn session_runs_on_loaded_stage() {
    let stage = StageLoader::new(ensure_server())
        .load_or_empty(STAGE_KEY)
        .await;
    let mut session = GameSession::new(
        stage,
        SessionOptions {
            local_id: "local".to_string(),
            seed: 7,
            ..SessionOptions::default()
        },
    );

    let input = FrameInput {
        right: true,
        ..FrameInput::default()
    };
    session.tick(&input, 0.0);
    let mut events = Vec::new();
    for i in 1..60 {
        events.extend(session.tick(&input, f64::from(i) * 0.016).events);
    }

    // The generator sits one tile east of spawn
    assert_eq!(events, vec!["gen".to_string()]);
    assert!(session.player().x > 60.0);
}
