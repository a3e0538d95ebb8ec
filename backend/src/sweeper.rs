use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::clock;
use crate::state::AppState;

/// Periodic staleness sweep: any vehicle silent past the configured window is
/// marked inactive and its session closed. The store snapshots candidate ids
/// before touching entries, so the sweep never holds a lock across the scan.
pub async fn sweeper_task(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut tick = interval(state.cfg.sweep_interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now_ms = clock::now_ms();
                let expired = state.store.sweep_stale(now_ms, state.cfg.staleness_window_ms);
                for id in expired {
                    tracing::warn!(vehicle = %id, "vehicle went silent, marking inactive");
                    state.sessions.expire(&id);
                }
            }
            recv = shutdown_rx.recv() => {
                match recv {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) | Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }
}
