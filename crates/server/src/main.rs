mod api;
mod bootstrap;
mod health;
mod observe;
mod scheduler;
mod services;

use anyhow::Result;
use crewflow_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use crewflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    if app.config.scheduler.enabled {
        let scheduler = app.scheduler.clone();
        let sweep_interval_secs = app.config.scheduler.sweep_interval_secs;
        tokio::spawn(async move {
            scheduler.run(sweep_interval_secs).await;
        });
        tracing::info!(
            event_name = "system.scheduler.started",
            correlation_id = "bootstrap",
            sweep_interval_secs,
            "escalation scheduler started"
        );
    } else {
        tracing::info!(
            event_name = "system.scheduler.disabled",
            correlation_id = "bootstrap",
            "escalation scheduler disabled by configuration"
        );
    }

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "crewflow-server listening"
    );

    axum::serve(listener, api::router(app.state.clone()))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "crewflow-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
