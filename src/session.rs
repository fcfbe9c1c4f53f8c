//! Test session and measurement data model
//!
//! The session CRUD surface lives in the external API/storage layers; this
//! module carries only the shapes the acquisition engine reads and writes.

use crate::registers::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle: `Idle -> Running -> {Completed, Cancelled}`.
///
/// The engine is the only writer of `Running` and `Completed` while a
/// session is active; `Cancelled` belongs to the external CRUD layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity for one thermal test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    /// Unique session id, assigned by the external CRUD layer
    pub id: i64,

    /// Truck body under test
    pub truck_id: String,

    /// Planned duration in minutes; `None` means unbounded
    pub duration_minutes: Option<u32>,

    /// Sample interval in seconds
    pub sample_interval_secs: u32,

    /// Lifecycle status
    pub status: SessionStatus,

    /// Set when the engine transitions the session to Running
    pub started_at: Option<DateTime<Utc>>,

    /// Set on explicit stop or autonomous completion
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestSession {
    /// Create a new idle session
    pub fn new(id: i64, truck_id: &str, duration_minutes: Option<u32>) -> Self {
        Self {
            id,
            truck_id: truck_id.to_string(),
            duration_minutes,
            sample_interval_secs: 5,
            status: SessionStatus::Idle,
            started_at: None,
            completed_at: None,
        }
    }
}

/// One sampled reading, immutable once written.
///
/// `energy_kwh` is computed by the energy integrator, not device-reported,
/// and is monotonically non-decreasing within a (session, channel) stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub session_id: i64,

    /// Logical channel that produced the reading
    #[serde(rename = "device_type")]
    pub channel: Channel,

    /// Instantaneous active power in watts
    pub power_w: f64,

    /// Cumulative session energy in kWh, seeded at zero at stream start
    pub energy_kwh: f64,

    /// Line voltage in volts, best-effort
    pub voltage_v: Option<f64>,

    /// Supply frequency in hertz, best-effort
    pub frequency_hz: Option<f64>,

    /// Host-clock capture instant at read completion
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_roundtrip() {
        assert_eq!(SessionStatus::Running.as_str(), "running");
        let yaml = serde_yaml::to_string(&SessionStatus::Completed).unwrap();
        let back: SessionStatus = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, SessionStatus::Completed);
    }

    #[test]
    fn test_measurement_serializes_device_type_tag() {
        let m = Measurement {
            session_id: 3,
            channel: Channel::Heater,
            power_w: 1500.0,
            energy_kwh: 0.25,
            voltage_v: Some(230.1),
            frequency_hz: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"device_type\":\"heater\""));
        assert!(json.contains("\"frequency_hz\":null"));
    }
}
