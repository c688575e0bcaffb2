mod bootstrap;
mod chat;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use leadlens_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;

fn init_logging(config: &AppConfig) {
    use leadlens_core::config::LogFormat::*;
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

    let router = chat::router(app.pipeline.clone()).merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "leadlens-server listening"
    );

    let shutdown_started = Arc::new(Notify::new());
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(Arc::clone(&shutdown_started)));

    tokio::select! {
        result = serve => result?,
        _ = async {
            shutdown_started.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(
                event_name = "system.server.forced_shutdown",
                grace_secs = grace.as_secs(),
                "connections still open after the grace period; exiting"
            );
        }
    }

    tracing::info!(event_name = "system.server.stopping", "leadlens-server stopping");
    Ok(())
}

async fn wait_for_shutdown(shutdown_started: Arc<Notify>) {
    let _ = tokio::signal::ctrl_c().await;
    shutdown_started.notify_one();
}
