use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw accelerometer reading as delivered by the platform sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to an earlier sample.
    ///
    /// Used as a cheap jerk proxy: the units are raw accelerometer units,
    /// not divided by the sampling interval.
    pub fn delta_from(&self, previous: &AccelerationSample) -> f64 {
        let dx = self.x - previous.x;
        let dy = self.y - previous.y;
        let dz = self.z - previous.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Disposition of a fall event on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallStatus {
    Pending,
    /// The user asked for help
    Confirmed,
    /// The user reported being okay
    Resolved,
}

impl FallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallStatus::Pending => "pending",
            FallStatus::Confirmed => "confirmed",
            FallStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedBy {
    Patient,
    Caregiver,
}

/// Fall event record owned by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallEvent {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default = "default_status")]
    pub status: FallStatus,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<ResolvedBy>,
    #[serde(default)]
    pub caregiver_notified: bool,
    #[serde(default)]
    pub caregiver_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_status() -> FallStatus {
    FallStatus::Pending
}
