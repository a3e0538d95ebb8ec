use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use fleettrack_shared::{VehicleId, VehicleUpdate};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Fan-out of position updates to live-feed subscribers.
///
/// Each subscriber gets its own bounded queue; publishing clones the sender
/// handles out of the registry entry before delivering, so a slow or closed
/// subscriber can never block the reporter or its neighbours. A full queue
/// drops that update for that subscriber only, mirroring how the WebSocket
/// layer tolerates lagging consumers.
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    subscribers: DashMap<VehicleId, Vec<SubscriberEntry>>,
    next_token: AtomicU64,
    queue_capacity: usize,
}

struct SubscriberEntry {
    token: u64,
    tx: mpsc::Sender<VehicleUpdate>,
}

impl HubInner {
    fn remove(&self, id: &VehicleId, token: u64) {
        let emptied = match self.subscribers.get_mut(id) {
            Some(mut entry) => {
                entry.retain(|sub| sub.token != token);
                entry.is_empty()
            }
            None => false,
        };
        if emptied {
            self.subscribers.remove_if(id, |_, subs| subs.is_empty());
        }
    }
}

impl SubscriptionHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: DashMap::new(),
                next_token: AtomicU64::new(0),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Register a new subscription for `id`, appended in registration order.
    /// If `snapshot` is given (the vehicle is currently active) it is queued
    /// immediately so the subscriber does not wait for the next report.
    pub fn subscribe(&self, id: &VehicleId, snapshot: Option<VehicleUpdate>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        if let Some(update) = snapshot {
            // queue is empty and capacity is at least 1
            let _ = tx.try_send(update);
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .entry(id.clone())
            .or_default()
            .push(SubscriberEntry { token, tx });

        Subscription {
            vehicle_id: id.clone(),
            token,
            rx,
            hub: Arc::clone(&self.inner),
        }
    }

    /// Deliver `update` to every live subscription for `id`, in registration
    /// order. Delivery happens outside the registry entry lock.
    pub fn publish(&self, id: &VehicleId, update: &VehicleUpdate) {
        let targets: Vec<(u64, mpsc::Sender<VehicleUpdate>)> = match self.inner.subscribers.get(id)
        {
            Some(entry) => entry.iter().map(|sub| (sub.token, sub.tx.clone())).collect(),
            None => return,
        };

        let mut closed = Vec::new();
        for (token, tx) in targets {
            match tx.try_send(update.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(vehicle = %id, "subscriber queue full, dropping update");
                }
                Err(TrySendError::Closed(_)) => closed.push(token),
            }
        }

        for token in closed {
            self.inner.remove(id, token);
        }
    }

    /// Deliver a terminal update to every subscriber of `id`, then remove
    /// them all; their streams end once the queue drains.
    pub fn close_all(&self, id: &VehicleId, terminal: &VehicleUpdate) {
        let Some((_, subs)) = self.inner.subscribers.remove(id) else {
            return;
        };
        for sub in subs {
            let _ = sub.tx.try_send(terminal.clone());
        }
    }

    pub fn subscriber_count(&self, id: &VehicleId) -> usize {
        self.inner.subscribers.get(id).map_or(0, |entry| entry.len())
    }
}

/// One live feed. Dropping it (or calling [`Subscription::cancel`])
/// deregisters from the hub, so cancellation can never leak a registry entry;
/// future publishes stop immediately, anything already queued is discarded
/// with the receiver.
pub struct Subscription {
    vehicle_id: VehicleId,
    token: u64,
    rx: mpsc::Receiver<VehicleUpdate>,
    hub: Arc<HubInner>,
}

impl Subscription {
    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    /// Next update, or None once the vehicle's session has ended and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<VehicleUpdate> {
        self.rx.recv().await
    }

    pub fn cancel(self) {
        // Drop does the deregistration
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(&self.vehicle_id, self.token);
    }
}

impl Stream for Subscription {
    type Item = VehicleUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
