//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::config::AllowedOrigins;
use crate::game::stage::{read_stage_file, StageError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Upper bound for plain HTTP requests; upgraded sockets are not affected
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = match &state.config.client_origin {
        AllowedOrigins::Any => CorsLayer::new().allow_origin(Any),
        AllowedOrigins::List(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|s| s.parse::<HeaderValue>().ok())
                .collect();
            CorsLayer::new().allow_origin(allowed)
        }
    }
    .allow_methods([Method::GET, Method::OPTIONS])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/stages/:key", get(stage_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    rooms: usize,
    peers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        rooms: state.rooms.room_count(),
        peers: state.rooms.peer_count(),
    })
}

// ============================================================================
// Stage files
// ============================================================================

/// `GET /stages/:key` with or without a `.json` suffix
async fn stage_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let key = key.strip_suffix(".json").unwrap_or(&key);
    let text = read_stage_file(&state.config.stage_dir, key).await?;
    debug!(stage = %key, bytes = text.len(), "Serving stage file");
    Ok(([(header::CONTENT_TYPE, "application/json")], text).into_response())
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StageError> for AppError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::InvalidKey(key) => AppError::BadRequest(format!("invalid stage key {key:?}")),
            StageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                AppError::NotFound("stage not found".to_string())
            }
            StageError::Io(io) => {
                warn!(error = %io, "Stage file read failed");
                AppError::Internal("failed to read stage".to_string())
            }
            other => AppError::Unprocessable(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
