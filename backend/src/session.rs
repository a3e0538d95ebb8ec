use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use fleettrack_shared::{Position, VehicleId, VehicleStatus, VehicleUpdate};

use crate::clock;
use crate::error::TrackingError;
use crate::hub::SubscriptionHub;
use crate::store::PositionStore;

/// Open-session registry: at most one live session per vehicle.
///
/// Each open session is a generation number in the table; `start` on an
/// already-open vehicle supersedes in place (the generation advances, the old
/// handle dies, subscribers stay continuously active). `report` holds the
/// session entry's read guard across the store write and the fan-out, which
/// serializes it against a concurrent `stop` for the same vehicle.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    sessions: DashMap<VehicleId, u64>,
    next_generation: AtomicU64,
    store: Arc<PositionStore>,
    hub: Arc<SubscriptionHub>,
}

impl SessionManager {
    pub fn new(store: Arc<PositionStore>, hub: Arc<SubscriptionHub>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                sessions: DashMap::new(),
                next_generation: AtomicU64::new(0),
                store,
                hub,
            }),
        }
    }

    /// Open a tracking session for `id`, superseding any prior one.
    pub fn start(&self, id: VehicleId) -> TrackingSession {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let superseded = self.inner.sessions.insert(id.clone(), generation);
        if superseded.is_some() {
            tracing::info!(vehicle = %id, "tracking session superseded");
        } else {
            tracing::info!(vehicle = %id, "tracking session opened");
        }
        TrackingSession { id, generation, manager: self.clone() }
    }

    /// Record a position report for whichever session is currently open.
    pub fn report(&self, id: &VehicleId, position: Position) -> Result<(), TrackingError> {
        let Some(_open) = self.inner.sessions.get(id) else {
            return Err(TrackingError::InvalidState(id.clone()));
        };
        self.deliver(id, position);
        Ok(())
    }

    /// Close the open session for `id`, whatever its generation. No-op if
    /// none is open.
    pub fn stop(&self, id: &VehicleId) {
        if self.inner.sessions.remove(id).is_none() {
            return;
        }
        self.close(id, "tracking session stopped");
    }

    /// Sweeper entry point: the store has already marked `id` inactive; close
    /// its session unless a report revived it in the meantime.
    pub fn expire(&self, id: &VehicleId) {
        let revived = self
            .inner
            .store
            .get(id)
            .is_some_and(|record| record.status == VehicleStatus::Active);
        if revived {
            return;
        }
        if self.inner.sessions.remove(id).is_some() {
            self.close(id, "tracking session expired after silence");
        }
    }

    pub fn is_open(&self, id: &VehicleId) -> bool {
        self.inner.sessions.contains_key(id)
    }

    fn deliver(&self, id: &VehicleId, position: Position) {
        self.inner.store.update(id, position.clone(), clock::now_ms());
        let update = VehicleUpdate {
            vehicle_id: id.clone(),
            status: VehicleStatus::Active,
            position: Some(position),
        };
        self.inner.hub.publish(id, &update);
    }

    fn close(&self, id: &VehicleId, reason: &'static str) {
        self.inner.store.mark_inactive(id);
        let last_position = self.inner.store.get(id).and_then(|record| record.last_position);
        let terminal = VehicleUpdate {
            vehicle_id: id.clone(),
            status: VehicleStatus::Inactive,
            position: last_position,
        };
        self.inner.hub.close_all(id, &terminal);
        tracing::info!(vehicle = %id, "{reason}");
    }
}

/// Driver-side handle to one open session, pinned to its generation.
/// Superseded or stopped handles report `InvalidState`; their `stop` is a
/// no-op so a stale handle cannot kill its successor.
pub struct TrackingSession {
    id: VehicleId,
    generation: u64,
    manager: SessionManager,
}

impl TrackingSession {
    pub fn vehicle_id(&self) -> &VehicleId {
        &self.id
    }

    pub fn report(&self, position: Position) -> Result<(), TrackingError> {
        match self.manager.inner.sessions.get(&self.id) {
            Some(open) if *open == self.generation => {
                // guard held across delivery, same as the manager path
                self.manager.deliver(&self.id, position);
                drop(open);
                Ok(())
            }
            _ => Err(TrackingError::InvalidState(self.id.clone())),
        }
    }

    pub fn stop(&self) {
        let removed = self
            .manager
            .inner
            .sessions
            .remove_if(&self.id, |_, generation| *generation == self.generation);
        if removed.is_some() {
            self.manager.close(&self.id, "tracking session stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleettrack_shared::Location;
    use pretty_assertions::assert_eq;

    fn id(raw: &str) -> VehicleId {
        VehicleId::parse(raw).unwrap()
    }

    fn position(name: &str, observed_at_ms: u64) -> Position {
        Position { location: Location::Named(name.to_string()), observed_at_ms }
    }

    fn manager() -> (SessionManager, Arc<PositionStore>, Arc<SubscriptionHub>) {
        let store = Arc::new(PositionStore::new());
        let hub = Arc::new(SubscriptionHub::new(8));
        let sessions = SessionManager::new(Arc::clone(&store), Arc::clone(&hub));
        (sessions, store, hub)
    }

    #[test]
    fn report_without_open_session_is_invalid_state() {
        let (sessions, _store, _hub) = manager();
        let v = id("CT-1234");
        assert_eq!(
            sessions.report(&v, position("Main St", 100)),
            Err(TrackingError::InvalidState(v))
        );
    }

    #[test]
    fn report_after_stop_is_invalid_state() {
        let (sessions, store, _hub) = manager();
        let v = id("CT-1234");
        let session = sessions.start(v.clone());
        session.report(position("Main St", 100)).unwrap();
        session.stop();

        assert_eq!(store.get(&v).unwrap().status, VehicleStatus::Inactive);
        assert_eq!(
            session.report(position("2nd Ave", 200)),
            Err(TrackingError::InvalidState(v.clone()))
        );
        assert_eq!(
            sessions.report(&v, position("2nd Ave", 200)),
            Err(TrackingError::InvalidState(v))
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_delivers_one_terminal_update() {
        let (sessions, _store, hub) = manager();
        let v = id("CT-1234");
        let session = sessions.start(v.clone());
        session.report(position("Main St", 100)).unwrap();

        let mut sub = hub.subscribe(&v, None);
        session.stop();
        session.stop();
        sessions.stop(&v);

        let terminal = sub.recv().await.unwrap();
        assert_eq!(terminal.status, VehicleStatus::Inactive);
        assert_eq!(terminal.position, Some(position("Main St", 100)));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn supersede_invalidates_old_handle_and_keeps_subscribers_active() {
        let (sessions, _store, hub) = manager();
        let v = id("CT-1234");
        let first = sessions.start(v.clone());
        first.report(position("Main St", 100)).unwrap();

        let mut sub = hub.subscribe(&v, None);
        let second = sessions.start(v.clone());

        assert_eq!(
            first.report(position("Ghost", 150)),
            Err(TrackingError::InvalidState(v.clone()))
        );
        second.report(position("2nd Ave", 200)).unwrap();

        // no inactive flicker across the restart: the next delivery is the
        // new session's active report
        let seen = sub.recv().await.unwrap();
        assert_eq!(seen.status, VehicleStatus::Active);
        assert_eq!(seen.position, Some(position("2nd Ave", 200)));
    }

    #[test]
    fn stale_handle_stop_does_not_kill_successor() {
        let (sessions, store, _hub) = manager();
        let v = id("CT-1234");
        let first = sessions.start(v.clone());
        let second = sessions.start(v.clone());

        first.stop();
        assert!(sessions.is_open(&v));
        second.report(position("Main St", 100)).unwrap();
        assert_eq!(store.get(&v).unwrap().status, VehicleStatus::Active);
    }

    #[tokio::test]
    async fn expire_closes_session_and_notifies_subscribers() {
        let (sessions, store, hub) = manager();
        let v = id("CT-1234");
        let session = sessions.start(v.clone());
        session.report(position("Main St", 100)).unwrap();

        let mut sub = hub.subscribe(&v, None);

        // far-future sweep: the vehicle has been silent past any window
        let expired = store.sweep_stale(clock::now_ms() + 60_000, 500);
        assert_eq!(expired, vec![v.clone()]);
        sessions.expire(&v);

        assert!(!sessions.is_open(&v));
        assert_eq!(sub.recv().await.unwrap().status, VehicleStatus::Inactive);
        assert_eq!(sub.recv().await, None);
        assert_eq!(
            session.report(position("Late", 200)),
            Err(TrackingError::InvalidState(v))
        );
    }

    #[test]
    fn expire_spares_a_revived_vehicle() {
        let (sessions, store, _hub) = manager();
        let v = id("CT-1234");
        let session = sessions.start(v.clone());
        session.report(position("Main St", 100)).unwrap();

        // report landed after the sweep marked it inactive
        store.mark_inactive(&v);
        session.report(position("Tunnel exit", 200)).unwrap();

        sessions.expire(&v);
        assert!(sessions.is_open(&v));
        assert_eq!(store.get(&v).unwrap().status, VehicleStatus::Active);
    }
}
