mod bootstrap;
mod deck;
mod health;
mod ping;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use deckgen_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;

fn init_logging(config: &AppConfig) {
    use deckgen_core::config::LogFormat::*;
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

    let app = bootstrap::bootstrap_with_config(config)?;

    let router = deck::router(app.state.clone())
        .merge(ping::router(app.state.clone()))
        .merge(health::router(app.health_state.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "deckgen server listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal_notify = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(event_name = "system.server.stopping", "shutdown signal received");
            signal_notify.notify_waiters();
        }
    });

    let serve_notify = Arc::clone(&shutdown);
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        serve_notify.notified().await;
    });

    // Give in-flight requests a bounded window to drain after the signal.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let forced = async {
        shutdown.notified().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result?,
        _ = forced => {
            tracing::warn!(
                event_name = "system.server.forced_shutdown",
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed, exiting"
            );
        }
    }

    tracing::info!(event_name = "system.server.stopped", "deckgen server stopped");
    Ok(())
}
