//! Storage interface consumed by the acquisition engine
//!
//! The relational schema and its persistence mechanics are owned by an
//! external layer; the engine only needs the operations below. `MemoryStore`
//! is the in-process reference implementation used by the binary entrypoint
//! and the test suite.

use crate::error::{Result, ThermorigError};
use crate::logging::get_logger;
use crate::registers::Channel;
use crate::session::{Measurement, TestSession};
use std::collections::HashMap;
use std::sync::Mutex;

/// Operations the engine requires from the storage layer.
///
/// Implementations must be safe to call from the polling task and from
/// API-facing callers concurrently.
pub trait SessionStore: Send + Sync {
    /// Fetch a session by id
    fn get_session(&self, session_id: i64) -> Option<TestSession>;

    /// Replace the stored session row
    fn update_session(&self, session: TestSession) -> Result<()>;

    /// Append one measurement row
    fn insert_measurement(&self, measurement: Measurement) -> Result<()>;

    /// Most recent measurement of a (session, channel) stream, by timestamp
    fn last_measurement(&self, session_id: i64, channel: Channel) -> Option<Measurement>;

    /// All measurements of a session in insertion order
    fn measurements(&self, session_id: i64) -> Vec<Measurement>;
}

struct MemoryStoreInner {
    sessions: HashMap<i64, TestSession>,
    measurements: Vec<Measurement>,
}

/// Mutex-guarded in-memory store
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
    logger: crate::logging::StructuredLogger,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStoreInner {
                sessions: HashMap::new(),
                measurements: Vec::new(),
            }),
            logger: get_logger("store"),
        }
    }

    /// Insert or replace a session row; used by tests and the entrypoint in
    /// place of the external CRUD layer
    pub fn put_session(&self, session: TestSession) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sessions.insert(session.id, session);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreInner>> {
        self.inner
            .lock()
            .map_err(|_| ThermorigError::storage("store mutex poisoned"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemoryStore {
    fn get_session(&self, session_id: i64) -> Option<TestSession> {
        self.lock().ok()?.sessions.get(&session_id).cloned()
    }

    fn update_session(&self, session: TestSession) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.sessions.contains_key(&session.id) {
            return Err(ThermorigError::storage(format!(
                "session {} does not exist",
                session.id
            )));
        }
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    fn insert_measurement(&self, measurement: Measurement) -> Result<()> {
        let mut inner = self.lock()?;
        self.logger.debug(&format!(
            "measurement stored: session={} channel={} power={:.1}W energy={:.4}kWh",
            measurement.session_id, measurement.channel, measurement.power_w, measurement.energy_kwh
        ));
        inner.measurements.push(measurement);
        Ok(())
    }

    fn last_measurement(&self, session_id: i64, channel: Channel) -> Option<Measurement> {
        let inner = self.lock().ok()?;
        inner
            .measurements
            .iter()
            .filter(|m| m.session_id == session_id && m.channel == channel)
            .max_by_key(|m| m.timestamp)
            .cloned()
    }

    fn measurements(&self, session_id: i64) -> Vec<Measurement> {
        match self.lock() {
            Ok(inner) => inner
                .measurements
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn measurement(session_id: i64, channel: Channel, secs: i64, power: f64) -> Measurement {
        Measurement {
            session_id,
            channel,
            power_w: power,
            energy_kwh: 0.0,
            voltage_v: None,
            frequency_hz: None,
            timestamp: Utc.timestamp_opt(secs, 0).single().unwrap(),
        }
    }

    #[test]
    fn test_last_measurement_is_per_stream() {
        let store = MemoryStore::new();
        store
            .insert_measurement(measurement(1, Channel::Heater, 100, 1000.0))
            .unwrap();
        store
            .insert_measurement(measurement(1, Channel::Fan, 101, 80.0))
            .unwrap();
        store
            .insert_measurement(measurement(1, Channel::Heater, 105, 1010.0))
            .unwrap();

        let last = store.last_measurement(1, Channel::Heater).unwrap();
        assert_eq!(last.power_w, 1010.0);
        let last_fan = store.last_measurement(1, Channel::Fan).unwrap();
        assert_eq!(last_fan.power_w, 80.0);
        assert!(store.last_measurement(2, Channel::Heater).is_none());
    }

    #[test]
    fn test_update_missing_session_is_storage_error() {
        let store = MemoryStore::new();
        let session = TestSession::new(9, "TRK-042", None);
        assert!(matches!(
            store.update_session(session),
            Err(ThermorigError::Storage { .. })
        ));
    }
}
