//! Acquisition engine: session lifecycle and the polling loop
//!
//! The engine owns the serial device reader and the single background
//! polling task. `start`/`stop`/status reads are serialized by one control
//! mutex so concurrent callers cannot race two sessions into running;
//! exactly one session is RUNNING system-wide at any time. The polling loop
//! is cancellable through a watch channel observed at the top of each cycle
//! and is never terminated by read errors: every failure class short of an
//! explicit stop, autonomous completion or process shutdown degrades to
//! "skip this cycle and continue".

use crate::config::{AcquisitionConfig, Config};
use crate::error::{Result, ThermorigError};
use crate::integrator::cumulative_energy_kwh;
use crate::logging::get_logger;
use crate::meter::{ChannelReader, ChannelReading, MeterReader};
use crate::registers::Channel;
use crate::session::{Measurement, SessionStatus};
use crate::store::SessionStore;
use chrono::Utc;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

/// Factory producing a device reader; injectable so tests can substitute a
/// mock meter for the serial hardware.
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn ChannelReader> + Send + Sync>;

/// Live engine status, shared with the polling task
#[derive(Debug, Clone, Default)]
struct EngineStatus {
    running: bool,
    session_id: Option<i64>,
}

/// Control-side state, touched only under the control mutex
struct EngineControl {
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

/// Acquisition engine bound to a storage layer and a reader factory.
///
/// Constructed explicitly and passed to the API layer by the host
/// application; there is no global instance.
pub struct AcquisitionEngine {
    config: Config,
    store: Arc<dyn SessionStore>,
    reader_factory: ReaderFactory,
    control: Mutex<EngineControl>,
    status: Arc<StdMutex<EngineStatus>>,
    logger: crate::logging::StructuredLogger,
}

impl AcquisitionEngine {
    /// Create an engine reading the configured meter over the serial bus
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Self {
        let reader_config = config.clone();
        Self::with_reader_factory(
            config,
            store,
            Box::new(move || Box::new(MeterReader::new(&reader_config))),
        )
    }

    /// Create an engine with an injected device reader factory
    pub fn with_reader_factory(
        config: Config,
        store: Arc<dyn SessionStore>,
        reader_factory: ReaderFactory,
    ) -> Self {
        Self {
            config,
            store,
            reader_factory,
            control: Mutex::new(EngineControl {
                stop_tx: None,
                handle: None,
            }),
            status: Arc::new(StdMutex::new(EngineStatus::default())),
            logger: get_logger("engine"),
        }
    }

    /// Start acquisition for a test session.
    ///
    /// Rejected with a typed error (no state change, no second polling task)
    /// when acquisition is already running, the session does not exist or is
    /// not idle, or the serial device cannot be connected. All of these are
    /// expected failure modes carrying a human-readable reason.
    pub async fn start(&self, session_id: i64, sample_interval_secs: u64) -> Result<()> {
        let mut control = self.control.lock().await;

        if self.is_running() {
            let message = "Acquisition already running for another session";
            self.logger.warn(message);
            return Err(ThermorigError::session_state(message));
        }

        let Some(mut session) = self.store.get_session(session_id) else {
            let message = format!("Session {} not found", session_id);
            self.logger.error(&message);
            return Err(ThermorigError::session_state(message));
        };

        if session.status != SessionStatus::Idle {
            let message = format!(
                "Session {} cannot be started: status is '{}' (must be 'idle')",
                session_id, session.status
            );
            self.logger.error(&message);
            return Err(ThermorigError::session_state(message));
        }

        let mut reader = (self.reader_factory)();
        if !reader.is_connected() && !reader.connect().await {
            let message = format!(
                "Cannot connect to the Modbus device on {}. Check that the \
                 USB-RS485 adapter is plugged in, the configured port is \
                 correct and no other program is holding it open",
                self.config.serial.port
            );
            self.logger.warn(&message);
            return Err(ThermorigError::connection(message));
        }

        session.status = SessionStatus::Running;
        session.started_at = Some(Utc::now());
        session.sample_interval_secs = sample_interval_secs as u32;
        let duration = session
            .duration_minutes
            .map(|m| Duration::from_secs(u64::from(m) * 60));
        self.store.update_session(session)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = PollContext {
            store: Arc::clone(&self.store),
            status: Arc::clone(&self.status),
            acquisition: self.config.acquisition.clone(),
            inter_request_delay: self.config.serial.inter_request_delay(),
            session_id,
            duration,
            sample_interval: Duration::from_secs(sample_interval_secs.max(1)),
            started: Instant::now(),
            stop_rx,
            reader,
            logger: crate::logging::get_logger_with_context(
                crate::logging::LogContext::new("poll").with_session_id(session_id),
            ),
        };

        if let Ok(mut status) = self.status.lock() {
            status.running = true;
            status.session_id = Some(session_id);
        }
        control.stop_tx = Some(stop_tx);
        control.handle = Some(tokio::spawn(poll_loop(ctx)));

        self.logger.info(&format!(
            "Acquisition started for session {} (sample interval: {}s)",
            session_id, sample_interval_secs
        ));
        Ok(())
    }

    /// Stop acquisition and mark the session completed. Idempotent: a stop
    /// with nothing running is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;

        let session_id = {
            let Ok(status) = self.status.lock() else {
                return Err(ThermorigError::generic("engine status mutex poisoned"));
            };
            if !status.running {
                return Ok(());
            }
            status.session_id
        };

        if let Some(stop_tx) = control.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        if let Some(handle) = control.handle.take() {
            let grace = Duration::from_secs_f64(self.config.acquisition.stop_grace_secs);
            if timeout(grace, handle).await.is_err() {
                self.logger
                    .warn("Polling task did not stop within the grace period");
            }
        }

        if let Some(session_id) = session_id {
            self.complete_session(session_id)?;
            self.logger
                .info(&format!("Session {} completed", session_id));
        }

        if let Ok(mut status) = self.status.lock() {
            status.running = false;
            status.session_id = None;
        }
        Ok(())
    }

    /// Stop acquisition and release the serial transport; called once at
    /// process teardown.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await?;
        self.logger.info("Acquisition engine shut down");
        Ok(())
    }

    /// Whether a polling task is currently active
    pub fn is_running(&self) -> bool {
        self.status.lock().map(|s| s.running).unwrap_or(false)
    }

    /// The session bound to the active polling task, if any
    pub fn current_session_id(&self) -> Option<i64> {
        self.status.lock().ok().and_then(|s| s.session_id)
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn complete_session(&self, session_id: i64) -> Result<()> {
        if let Some(mut session) = self.store.get_session(session_id) {
            if session.status == SessionStatus::Running {
                session.status = SessionStatus::Completed;
                session.completed_at = Some(Utc::now());
                self.store.update_session(session)?;
            }
        }
        Ok(())
    }
}

/// Everything the polling task owns while it runs
struct PollContext {
    store: Arc<dyn SessionStore>,
    status: Arc<StdMutex<EngineStatus>>,
    acquisition: AcquisitionConfig,
    inter_request_delay: Duration,
    session_id: i64,
    duration: Option<Duration>,
    sample_interval: Duration,
    started: Instant,
    stop_rx: watch::Receiver<bool>,
    reader: Box<dyn ChannelReader>,
    logger: crate::logging::StructuredLogger,
}

impl PollContext {
    /// Mark the session completed and clear the live status; used on the
    /// autonomous completion path, which cannot go through `stop()` because
    /// the loop cannot join itself.
    fn complete_autonomously(&self) {
        if let Some(mut session) = self.store.get_session(self.session_id) {
            if session.status == SessionStatus::Running {
                session.status = SessionStatus::Completed;
                session.completed_at = Some(Utc::now());
                if let Err(e) = self.store.update_session(session) {
                    self.logger
                        .error(&format!("Failed to mark session completed: {}", e));
                }
            }
        }
        if let Ok(mut status) = self.status.lock() {
            status.running = false;
            status.session_id = None;
        }
    }

    /// Integrate energy for the stream and persist one measurement. Storage
    /// failures are logged and never terminate the loop.
    fn persist_reading(&self, channel: Channel, reading: ChannelReading) {
        let timestamp = Utc::now();
        let previous = self.store.last_measurement(self.session_id, channel);
        let energy_kwh = cumulative_energy_kwh(previous.as_ref(), timestamp, reading.power_w);

        let measurement = Measurement {
            session_id: self.session_id,
            channel,
            power_w: reading.power_w,
            energy_kwh,
            voltage_v: reading.voltage_v,
            frequency_hz: reading.frequency_hz,
            timestamp,
        };

        self.logger.debug(&format!(
            "Persisting measurement: {}",
            serde_json::to_string(&measurement).unwrap_or_default()
        ));

        if let Err(e) = self.store.insert_measurement(measurement) {
            self.logger
                .error(&format!("Failed to persist {} measurement: {}", channel, e));
        }
    }

    /// Sleep, returning early with `true` when stop is requested
    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => false,
            _ = self.stop_rx.changed() => true,
        }
    }
}

/// The background polling loop: one cycle reads every channel in fixed
/// order, persists whatever succeeded, and manages reconnection on repeated
/// whole-cycle failures.
async fn poll_loop(mut ctx: PollContext) {
    ctx.logger.info("Polling task started");
    let mut consecutive_failures: u32 = 0;

    loop {
        if *ctx.stop_rx.borrow() {
            break;
        }

        // Autonomous completion by elapsed duration, checked before each poll
        if let Some(duration) = ctx.duration {
            if ctx.started.elapsed() >= duration {
                ctx.logger.info(&format!(
                    "Planned duration reached ({}s), completing session",
                    duration.as_secs()
                ));
                ctx.complete_autonomously();
                ctx.logger.info("Polling task finished");
                return;
            }
        }

        // The device may have been unplugged between cycles
        if !ctx.reader.is_connected() {
            ctx.logger.warn("Serial connection lost, reconnecting");
            if ctx.reader.connect().await {
                ctx.logger.info("Reconnected to Modbus device");
                consecutive_failures = 0;
            } else {
                let backoff = ctx.sample_interval * ctx.acquisition.reconnect_backoff_factor;
                ctx.logger
                    .warn(&format!("Reconnect failed, backing off {:?}", backoff));
                if ctx.sleep_or_stop(backoff).await {
                    break;
                }
                continue;
            }
        }

        // Poll each channel in fixed order; the bus allows one talker at a
        // time, so space the requests out
        let mut readings: Vec<(Channel, ChannelReading)> = Vec::with_capacity(Channel::ALL.len());
        for (i, channel) in Channel::ALL.iter().enumerate() {
            if i > 0 && !ctx.inter_request_delay.is_zero() {
                sleep(ctx.inter_request_delay).await;
            }
            match ctx.reader.read_all(*channel).await {
                Some(reading) => readings.push((*channel, reading)),
                None => ctx
                    .logger
                    .debug(&format!("No data from {} this cycle", channel)),
            }
        }

        if readings.is_empty() {
            consecutive_failures += 1;
            ctx.logger.warn(&format!(
                "All channels failed this cycle ({}/{})",
                consecutive_failures, ctx.acquisition.max_consecutive_failures
            ));
            if consecutive_failures >= ctx.acquisition.max_consecutive_failures {
                ctx.logger
                    .warn("Too many consecutive failures, forcing reconnect");
                ctx.reader.disconnect();
                if ctx.reader.connect().await {
                    consecutive_failures = 0;
                } else {
                    let backoff = ctx.sample_interval * ctx.acquisition.reconnect_backoff_factor;
                    ctx.logger
                        .error(&format!("Reconnect failed, backing off {:?}", backoff));
                    if ctx.sleep_or_stop(backoff).await {
                        break;
                    }
                    continue;
                }
            }
        } else {
            if consecutive_failures > 0 {
                ctx.logger.info(&format!(
                    "Bus recovered after {} failed cycles",
                    consecutive_failures
                ));
            }
            consecutive_failures = 0;
        }

        // A failed fan read never blocks saving a successful heater read
        for (channel, reading) in readings {
            ctx.persist_reading(channel, reading);
        }

        if ctx.sleep_or_stop(ctx.sample_interval).await {
            break;
        }
    }

    ctx.logger.info("Polling task finished");
}
