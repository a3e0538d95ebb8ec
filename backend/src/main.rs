// main.rs

mod clock;
mod config;
mod error;
mod hub;
mod query;
mod session;
mod state;
mod store;
mod sweeper;
mod web;

use crate::config::TrackerConfig;
use crate::state::AppState;
use crate::sweeper::sweeper_task;

use axum::Router;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = TrackerConfig::from_env();
    let state = Arc::new(AppState::new(cfg.clone()));

    // --- Background tasks ---
    let _st = tokio::spawn(sweeper_task(state.clone(), state.shutdown_tx.subscribe()));

    // --- Webserver ---
    let app: Router = web::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "fleettrack listening");
    axum::serve(listener, app).await?;
    Ok(())
}
