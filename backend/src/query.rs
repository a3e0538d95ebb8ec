use std::sync::Arc;

use fleettrack_shared::{LookupResponse, VehicleId, VehicleStatus, VehicleUpdate};

use crate::error::TrackingError;
use crate::hub::{Subscription, SubscriptionHub};
use crate::store::{PositionStore, VehicleRecord};

/// Passenger-facing read façade over the store and the hub. Stateless and
/// cheap to clone.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<PositionStore>,
    hub: Arc<SubscriptionHub>,
}

impl QueryService {
    pub fn new(store: Arc<PositionStore>, hub: Arc<SubscriptionHub>) -> Self {
        Self { store, hub }
    }

    /// One-shot status + position. A never-seen id is `NotFound`; the HTTP
    /// layer renders that as the `"unknown"` status shape.
    pub fn lookup(&self, raw_id: &str) -> Result<LookupResponse, TrackingError> {
        let id = VehicleId::parse(raw_id)?;
        match self.store.get(&id) {
            Some(record) => Ok(response_from(record)),
            None => Err(TrackingError::NotFound(id)),
        }
    }

    /// Live feed. Subscribing before any report is allowed — the first report
    /// becomes the first delivery. If the vehicle is currently active, the
    /// stored snapshot is delivered immediately.
    pub fn subscribe_live(&self, raw_id: &str) -> Result<Subscription, TrackingError> {
        let id = VehicleId::parse(raw_id)?;
        let snapshot = self
            .store
            .get(&id)
            .filter(|record| record.status == VehicleStatus::Active)
            .map(|record| VehicleUpdate {
                vehicle_id: id.clone(),
                status: record.status,
                position: record.last_position,
            });
        Ok(self.hub.subscribe(&id, snapshot))
    }

    /// Every vehicle the service has ever seen, ordered by id.
    pub fn fleet(&self) -> Vec<LookupResponse> {
        self.store.snapshot().into_iter().map(response_from).collect()
    }
}

fn response_from(record: VehicleRecord) -> LookupResponse {
    LookupResponse {
        vehicle_id: record.id,
        status: record.status,
        position: record.last_position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use fleettrack_shared::{Location, Position};
    use pretty_assertions::assert_eq;

    fn id(raw: &str) -> VehicleId {
        VehicleId::parse(raw).unwrap()
    }

    fn position(name: &str, observed_at_ms: u64) -> Position {
        Position { location: Location::Named(name.to_string()), observed_at_ms }
    }

    fn service() -> (QueryService, SessionManager) {
        let store = Arc::new(PositionStore::new());
        let hub = Arc::new(SubscriptionHub::new(8));
        let sessions = SessionManager::new(Arc::clone(&store), Arc::clone(&hub));
        (QueryService::new(store, hub), sessions)
    }

    #[test]
    fn lookup_of_never_seen_vehicle_is_not_found() {
        let (query, _sessions) = service();
        assert_eq!(query.lookup("UNKNOWN"), Err(TrackingError::NotFound(id("UNKNOWN"))));
    }

    #[test]
    fn lookup_rejects_empty_id() {
        let (query, _sessions) = service();
        assert!(matches!(query.lookup("   "), Err(TrackingError::InvalidVehicleId(_))));
    }

    #[test]
    fn track_then_lookup_then_stop_scenario() {
        let (query, sessions) = service();
        let session = sessions.start(id("CT-1234"));
        session.report(position("Main St", 100)).unwrap();

        // lookup is case-insensitive on input
        let looked_up = query.lookup("ct-1234").unwrap();
        assert_eq!(looked_up.vehicle_id, id("CT-1234"));
        assert_eq!(looked_up.status, VehicleStatus::Active);
        assert_eq!(looked_up.position, Some(position("Main St", 100)));

        session.stop();
        let after_stop = query.lookup("CT-1234").unwrap();
        assert_eq!(after_stop.status, VehicleStatus::Inactive);
        assert_eq!(after_stop.position, Some(position("Main St", 100)));
    }

    #[tokio::test]
    async fn subscribe_before_first_report_delivers_exactly_that_report() {
        let (query, sessions) = service();
        let mut feed = query.subscribe_live("CT-5678").unwrap();

        let session = sessions.start(id("CT-5678"));
        session.report(position("Gate A", 100)).unwrap();

        let seen = feed.recv().await.unwrap();
        assert_eq!(seen.status, VehicleStatus::Active);
        assert_eq!(seen.position, Some(position("Gate A", 100)));
    }

    #[tokio::test]
    async fn subscribe_to_active_vehicle_seeds_current_snapshot() {
        let (query, sessions) = service();
        let session = sessions.start(id("CT-1234"));
        session.report(position("Main St", 100)).unwrap();

        let mut feed = query.subscribe_live("CT-1234").unwrap();
        let seen = feed.recv().await.unwrap();
        assert_eq!(seen.position, Some(position("Main St", 100)));
    }

    #[test]
    fn fleet_lists_every_vehicle_ever_seen() {
        let (query, sessions) = service();
        let first = sessions.start(id("CT-1234"));
        first.report(position("Main St", 100)).unwrap();
        let second = sessions.start(id("CT-5678"));
        second.report(position("Gate A", 100)).unwrap();
        second.stop();

        let fleet = query.fleet();
        let statuses: Vec<(String, VehicleStatus)> = fleet
            .into_iter()
            .map(|entry| (entry.vehicle_id.as_str().to_string(), entry.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("CT-1234".to_string(), VehicleStatus::Active),
                ("CT-5678".to_string(), VehicleStatus::Inactive),
            ]
        );
    }
}
