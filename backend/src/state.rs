use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::TrackerConfig;
use crate::hub::SubscriptionHub;
use crate::query::QueryService;
use crate::session::SessionManager;
use crate::store::PositionStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: TrackerConfig,

    /// Latest position + status per vehicle
    pub store: Arc<PositionStore>,

    /// Live-feed fan-out to subscribers
    pub hub: Arc<SubscriptionHub>,

    /// Driver-side session registry (start/report/stop)
    pub sessions: SessionManager,

    /// Passenger-side reads (lookup/subscribe)
    pub query: QueryService,

    /// Shutdown signal for background tasks
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(cfg: TrackerConfig) -> Self {
        let store = Arc::new(PositionStore::new());
        let hub = Arc::new(SubscriptionHub::new(cfg.subscriber_queue));
        let sessions = SessionManager::new(Arc::clone(&store), Arc::clone(&hub));
        let query = QueryService::new(Arc::clone(&store), Arc::clone(&hub));

        Self {
            cfg,
            store,
            hub,
            sessions,
            query,
            shutdown_tx: broadcast::channel(16).0,
        }
    }
}
