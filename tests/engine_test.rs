//! Acquisition engine behavior against a mock device reader

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use thermorig::Config;
use thermorig::engine::AcquisitionEngine;
use thermorig::meter::{ChannelReader, ChannelReading};
use thermorig::registers::Channel;
use thermorig::session::{SessionStatus, TestSession};
use thermorig::store::{MemoryStore, SessionStore};

/// Shared knobs and counters for the mock reader
#[derive(Default)]
struct MockState {
    fail_connect: AtomicBool,
    fail_fan: AtomicBool,
    fail_all: AtomicBool,
    connects: AtomicU32,
    reads: AtomicU32,
}

struct MockReader {
    connected: bool,
    state: Arc<MockState>,
}

#[async_trait]
impl ChannelReader for MockReader {
    async fn connect(&mut self) -> bool {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            false
        } else {
            self.connected = true;
            true
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_all(&mut self, channel: Channel) -> Option<ChannelReading> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_all.load(Ordering::SeqCst) {
            return None;
        }
        if channel == Channel::Fan && self.state.fail_fan.load(Ordering::SeqCst) {
            return None;
        }
        let power_w = match channel {
            Channel::Heater => 1500.0,
            Channel::Fan => 80.0,
        };
        Some(ChannelReading {
            power_w,
            voltage_v: Some(230.0),
            frequency_hz: Some(50.0),
        })
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.serial.inter_request_delay_secs = 0.0;
    config.serial.post_connect_delay_secs = 0.0;
    config.acquisition.stop_grace_secs = 5.0;
    config
}

fn engine_with_mock(
    store: Arc<MemoryStore>,
    state: Arc<MockState>,
) -> AcquisitionEngine {
    AcquisitionEngine::with_reader_factory(
        test_config(),
        store as Arc<dyn SessionStore>,
        Box::new(move || {
            Box::new(MockReader {
                connected: false,
                state: Arc::clone(&state),
            })
        }),
    )
}

#[tokio::test]
async fn test_start_rejects_missing_session() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with_mock(Arc::clone(&store), Arc::new(MockState::default()));

    let err = engine.start(42, 5).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_start_rejects_non_idle_session() {
    let store = Arc::new(MemoryStore::new());
    let mut session = TestSession::new(1, "TRK-007", None);
    session.status = SessionStatus::Completed;
    store.put_session(session);

    let engine = engine_with_mock(Arc::clone(&store), Arc::new(MockState::default()));
    let err = engine.start(1, 5).await.unwrap_err();
    assert!(err.to_string().contains("must be 'idle'"));
    assert!(!engine.is_running());
}

#[tokio::test]
async fn test_start_rejects_when_device_absent() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-007", None));

    let state = Arc::new(MockState::default());
    state.fail_connect.store(true, Ordering::SeqCst);
    let engine = engine_with_mock(Arc::clone(&store), Arc::clone(&state));

    assert!(engine.start(1, 5).await.is_err());
    assert!(!engine.is_running());
    // The session must be untouched by a rejected start
    let session = store.get_session(1).unwrap();
    assert_eq!(session.status, SessionStatus::Idle);
    assert!(session.started_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_start_rejected_while_running() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-001", None));
    store.put_session(TestSession::new(2, "TRK-002", None));

    let state = Arc::new(MockState::default());
    let engine = engine_with_mock(Arc::clone(&store), Arc::clone(&state));

    engine.start(1, 5).await.unwrap();
    assert!(engine.is_running());
    assert_eq!(engine.current_session_id(), Some(1));

    let connects_before = state.connects.load(Ordering::SeqCst);
    let err = engine.start(2, 5).await.unwrap_err();
    assert!(err.to_string().contains("already running"));

    // The rejected start must not have spun up a second reader
    assert_eq!(state.connects.load(Ordering::SeqCst), connects_before);
    assert_eq!(engine.current_session_id(), Some(1));
    assert_eq!(store.get_session(2).unwrap().status, SessionStatus::Idle);

    engine.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_completes_session_and_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-011", None));

    let engine = engine_with_mock(Arc::clone(&store), Arc::new(MockState::default()));
    engine.start(1, 5).await.unwrap();

    let session = store.get_session(1).unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert!(session.started_at.is_some());

    engine.stop().await.unwrap();
    assert!(!engine.is_running());
    assert_eq!(engine.current_session_id(), None);

    let session = store.get_session(1).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.is_some());

    // Stopping again is a no-op and must not touch completed_at
    let completed_at = session.completed_at;
    engine.stop().await.unwrap();
    assert_eq!(store.get_session(1).unwrap().completed_at, completed_at);
}

#[tokio::test(start_paused = true)]
async fn test_measurements_accumulate_for_both_channels() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-020", None));

    let engine = engine_with_mock(Arc::clone(&store), Arc::new(MockState::default()));
    engine.start(1, 5).await.unwrap();

    tokio::time::sleep(Duration::from_secs(16)).await;
    engine.stop().await.unwrap();

    let measurements = store.measurements(1);
    let heater: Vec<_> = measurements
        .iter()
        .filter(|m| m.channel == Channel::Heater)
        .collect();
    let fan: Vec<_> = measurements
        .iter()
        .filter(|m| m.channel == Channel::Fan)
        .collect();

    assert!(heater.len() >= 3, "expected >= 3 heater samples, got {}", heater.len());
    assert_eq!(heater.len(), fan.len());
    assert!(heater.iter().all(|m| m.power_w == 1500.0));
    assert!(fan.iter().all(|m| m.power_w == 80.0));

    // Cumulative energy never decreases within a stream
    for pair in heater.windows(2) {
        assert!(pair[1].energy_kwh >= pair[0].energy_kwh);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fan_failure_does_not_block_heater_persistence() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-021", None));

    let state = Arc::new(MockState::default());
    state.fail_fan.store(true, Ordering::SeqCst);
    let engine = engine_with_mock(Arc::clone(&store), Arc::clone(&state));

    engine.start(1, 5).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    engine.stop().await.unwrap();

    let measurements = store.measurements(1);
    assert!(!measurements.is_empty());
    assert!(measurements.iter().all(|m| m.channel == Channel::Heater));

    // Partial success is not a failed cycle, so no reconnect was forced
    assert_eq!(state.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_whole_cycle_failures_force_reconnect() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-022", None));

    let state = Arc::new(MockState::default());
    state.fail_all.store(true, Ordering::SeqCst);
    let engine = engine_with_mock(Arc::clone(&store), Arc::clone(&state));

    engine.start(1, 1).await.unwrap();
    // Default threshold is 10 consecutive failed cycles
    tokio::time::sleep(Duration::from_secs(30)).await;
    engine.stop().await.unwrap();

    assert!(store.measurements(1).is_empty());
    assert!(
        state.connects.load(Ordering::SeqCst) >= 2,
        "expected a forced reconnect after repeated whole-cycle failures"
    );
}

#[tokio::test(start_paused = true)]
async fn test_duration_elapses_autonomously() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-030", Some(1)));

    let engine = engine_with_mock(Arc::clone(&store), Arc::new(MockState::default()));
    engine.start(1, 5).await.unwrap();

    tokio::time::sleep(Duration::from_secs(70)).await;

    // The loop completed the session on its own, without stop()
    assert!(!engine.is_running());
    assert_eq!(engine.current_session_id(), None);
    let session = store.get_session(1).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.completed_at.is_some());

    let count = store.measurements(1).len();

    // No further sampling after completion
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.measurements(1).len(), count);

    // stop() after autonomous completion stays a no-op
    engine.stop().await.unwrap();
    assert_eq!(store.get_session(1).unwrap().status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_completion_with_new_session() {
    let store = Arc::new(MemoryStore::new());
    store.put_session(TestSession::new(1, "TRK-040", None));
    store.put_session(TestSession::new(2, "TRK-040", None));

    let engine = engine_with_mock(Arc::clone(&store), Arc::new(MockState::default()));

    engine.start(1, 5).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    engine.stop().await.unwrap();

    engine.start(2, 5).await.unwrap();
    assert_eq!(engine.current_session_id(), Some(2));
    tokio::time::sleep(Duration::from_secs(6)).await;
    engine.stop().await.unwrap();

    // Streams are isolated per session: each session seeds energy at zero
    for session_id in [1, 2] {
        let first_heater = store
            .measurements(session_id)
            .into_iter()
            .find(|m| m.channel == Channel::Heater)
            .unwrap();
        assert_eq!(first_heater.energy_kwh, 0.0);
    }
}
