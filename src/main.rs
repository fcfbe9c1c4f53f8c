//! Binary entrypoint: run one acquisition session from the command line.
//!
//! Usage: `thermorig <truck-id> [duration-minutes]`
//!
//! Loads configuration from the default locations (or the file named by
//! `THERMORIG_CONFIG`), starts acquisition against an in-memory store and
//! runs until the planned duration elapses or Ctrl-C is received.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use thermorig::engine::AcquisitionEngine;
use thermorig::logging::init_logging;
use thermorig::session::TestSession;
use thermorig::store::{MemoryStore, SessionStore};
use thermorig::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let truck_id = args
        .next()
        .context("usage: thermorig <truck-id> [duration-minutes]")?;
    let duration_minutes = match args.next() {
        Some(raw) => Some(raw.parse::<u32>().context("duration must be a number of minutes")?),
        None => None,
    };

    let config = match std::env::var("THERMORIG_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        Err(_) => Config::load().context("failed to load configuration")?,
    };
    config.validate().context("invalid configuration")?;

    init_logging(&config.logging).context("failed to initialize logging")?;

    let store = Arc::new(MemoryStore::new());
    let session = TestSession::new(1, &truck_id, duration_minutes);
    store.put_session(session);

    let sample_interval = config.acquisition.default_sample_interval_secs;
    let engine = AcquisitionEngine::new(config, Arc::clone(&store) as Arc<dyn SessionStore>);

    engine
        .start(1, sample_interval)
        .await
        .context("failed to start acquisition")?;

    // Run until Ctrl-C or autonomous completion
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if !engine.is_running() {
                    tracing::info!("Session completed");
                    break;
                }
            }
        }
    }

    engine.shutdown().await.context("shutdown failed")?;

    for m in store.measurements(1) {
        println!(
            "{} {} {:.1} W {:.6} kWh",
            m.timestamp.format("%H:%M:%S"),
            m.channel,
            m.power_w,
            m.energy_kwh
        );
    }

    Ok(())
}
