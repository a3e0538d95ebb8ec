use fleettrack_shared::{InvalidVehicleId, VehicleId};
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum TrackingError {
    #[error(transparent)]
    InvalidVehicleId(#[from] InvalidVehicleId),

    /// Report against a vehicle with no open tracking session (never started,
    /// stopped, superseded, or expired by the staleness sweep).
    #[error("no open tracking session for vehicle {0}")]
    InvalidState(VehicleId),

    /// Lookup of a vehicle the service has never seen a report for.
    #[error("vehicle {0} has never reported")]
    NotFound(VehicleId),
}
