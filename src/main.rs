use std::time::Duration;

use welldata_fhir::config;
use welldata_fhir::server::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up WELLDATA_* overrides
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::config().clone();
    tracing::info!("Starting WellData FHIR server (solid enabled: {})", config.solid.enabled);

    let sweep_interval = Duration::from_secs(config.session.sweep_interval_secs);
    let port = config.server.port;

    let state = AppState::build(config).await?;
    state.sessions.spawn_sweeper(sweep_interval);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("WellData FHIR server listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await?;
    Ok(())
}
