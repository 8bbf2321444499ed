use super::ids::{TrackerId, VehicleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// Registered, not reporting.
    #[default]
    Inactive,
    /// Reporting.
    Active,
    /// Disabled; device login refused.
    Maintenance,
}

/// Origin of a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Satellite fix.
    #[default]
    Gps,
    /// Cell or wifi.
    Network,
    /// Entered by a person.
    Manual,
}

/// Last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Speed in km/h.
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub heading: Option<f64>,
    /// Accuracy radius in metres.
    pub accuracy: Option<f64>,
    /// Origin.
    pub source: LocationSource,
    /// Fix time.
    pub at: DateTime<Utc>,
}

/// Physical GPS device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTracker {
    /// Identifier.
    pub id: TrackerId,
    /// Unique hardware id.
    pub device_id: String,
    /// Human label.
    pub label: Option<String>,
    /// Currently attached vehicle.
    pub vehicle_id: Option<VehicleId>,
    /// Device status.
    pub status: TrackerStatus,
    /// Last snapshot.
    pub last_location: Option<LocationSnapshot>,
    /// Last contact.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}
