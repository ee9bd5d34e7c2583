//! Ice Age Operation relay server
//!
//! Entry point for the signaling server. It handles:
//! - WebSocket connections that pair browsers over WebRTC
//! - Stage file serving for the game client
//! - Health checks for the hosting platform

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ice_age_operation::{
    app::AppState,
    config::{Config, LogFormat},
    http::build_router,
    util::time::init_server_time,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    init_tracing(&config.log_level, config.log_format);
    init_server_time();

    info!(
        addr = %config.server_addr,
        stage_dir = %config.stage_dir.display(),
        signal_rate_limit = config.signal_rate_limit,
        "Starting Ice Age Operation relay"
    );

    let addr: SocketAddr = config.server_addr;
    let router = build_router(AppState::new(config));
    let listener = TcpListener::bind(addr).await?;

    info!("Health check: http://{}/health", addr);
    info!("Signaling endpoint: ws://{}/ws", addr);
    info!("Stage files: http://{}/stages/:key", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay stopped");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "terminate",
    };
    info!(signal, "Shutdown signal received");
}
