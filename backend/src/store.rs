use dashmap::DashMap;
use fleettrack_shared::{Position, VehicleId, VehicleStatus};

/// Latest known state for one tracked vehicle. Created on the first report
/// and never deleted; a vanished vehicle is marked inactive so its last
/// position stays queryable.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub status: VehicleStatus,
    pub last_position: Option<Position>,
    pub last_report_at_ms: Option<u64>,
}

/// Per-vehicle position table. DashMap gives per-entry locking, so mutations
/// of a single record are serialized while reads elsewhere in the table never
/// wait on a writer.
#[derive(Default)]
pub struct PositionStore {
    records: DashMap<VehicleId, VehicleRecord>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the record for `id`: status becomes Active and recency is
    /// refreshed. Last-write-wins by `observed_at_ms` — a report carrying an
    /// older observation than the stored one does not replace the position.
    pub fn update(&self, id: &VehicleId, position: Position, now_ms: u64) {
        let mut record = self.records.entry(id.clone()).or_insert_with(|| VehicleRecord {
            id: id.clone(),
            status: VehicleStatus::Active,
            last_position: None,
            last_report_at_ms: None,
        });

        record.status = VehicleStatus::Active;
        record.last_report_at_ms = Some(now_ms);

        let newer = record
            .last_position
            .as_ref()
            .is_none_or(|current| position.observed_at_ms >= current.observed_at_ms);
        if newer {
            record.last_position = Some(position);
        }
    }

    /// Active → Inactive without clearing the last position. Returns false if
    /// the id has never reported. Idempotent.
    pub fn mark_inactive(&self, id: &VehicleId) -> bool {
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.status = VehicleStatus::Inactive;
                true
            }
            None => false,
        }
    }

    /// Point-in-time snapshot of one record. Side-effect free.
    pub fn get(&self, id: &VehicleId) -> Option<VehicleRecord> {
        self.records.get(id).map(|record| record.clone())
    }

    /// Transition every Active record silent for longer than `timeout_ms` to
    /// Inactive and return the transitioned ids. Silence of exactly
    /// `timeout_ms` is not stale.
    ///
    /// Candidate ids are snapshotted first, then each entry is re-checked on
    /// its own lock, so the sweep never holds a lock across the table scan
    /// and a report landing mid-sweep wins.
    pub fn sweep_stale(&self, now_ms: u64, timeout_ms: u64) -> Vec<VehicleId> {
        let candidates: Vec<VehicleId> = self
            .records
            .iter()
            .filter(|record| record.status == VehicleStatus::Active)
            .map(|record| record.id.clone())
            .collect();

        let mut expired = Vec::new();
        for id in candidates {
            if let Some(mut record) = self.records.get_mut(&id) {
                if record.status != VehicleStatus::Active {
                    continue;
                }
                let stale = record
                    .last_report_at_ms
                    .is_some_and(|at| now_ms.saturating_sub(at) > timeout_ms);
                if stale {
                    record.status = VehicleStatus::Inactive;
                    expired.push(id);
                }
            }
        }
        expired
    }

    /// All records, ordered by id, for the fleet listing endpoint.
    pub fn snapshot(&self) -> Vec<VehicleRecord> {
        let mut all: Vec<VehicleRecord> =
            self.records.iter().map(|record| record.clone()).collect();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        all
    }
}
