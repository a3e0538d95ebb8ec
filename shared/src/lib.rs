use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Vehicle registration identifier, e.g. "CT-1234".
///
/// Input is case-insensitive: ids are trimmed and uppercased on construction,
/// and an empty id is rejected. Everything downstream of the parse works with
/// the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VehicleId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("vehicle id must not be empty")]
pub struct InvalidVehicleId;

impl VehicleId {
    pub fn parse(raw: &str) -> Result<Self, InvalidVehicleId> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(InvalidVehicleId);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VehicleId {
    type Error = InvalidVehicleId;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<VehicleId> for String {
    fn from(id: VehicleId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Active,
    Inactive,
    /// Only ever reported for ids the service has never seen.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Where a vehicle is: either a named stop/street or raw coordinates.
/// Untagged so the wire accepts `"Main Street & 2nd Avenue"` as well as
/// `{ "lat": .., "lon": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Point(GeoPoint),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub location: Location,
    pub observed_at_ms: u64,
}

/// One unit of live-feed delivery; also the WebSocket payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    pub vehicle_id: VehicleId,
    pub status: VehicleStatus,
    pub position: Option<Position>,
}

/// Body of `POST /api/vehicles/{id}/report`. A missing `observed_at_ms`
/// means "observed now" and is stamped server-side.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportRequest {
    pub location: Location,
    pub observed_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub vehicle_id: VehicleId,
    pub status: VehicleStatus,
    pub position: Option<Position>,
}
