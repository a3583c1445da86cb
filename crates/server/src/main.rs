//! Redi orchestration server entrypoint

use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redi_config::Settings;
use redi_server::{http, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("REDI_CONFIG").ok().map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(settings.observability.log_level.clone())
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cleanup_interval = Duration::from_secs(settings.session.cleanup_interval_secs);
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::build(settings)?;

    // Background maintenance: session sweep, health probes, alert sweep
    let _cleanup_shutdown = state.sessions.start_cleanup_task(cleanup_interval);
    let _health_shutdown = state.health.start();
    let _alerts_shutdown = state.alerts.start(state.metrics.clone());

    let app = http::router(state).layer(
        tower_http::trace::TraceLayer::new_for_http(),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "redi server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
