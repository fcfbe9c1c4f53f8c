//! Incremental energy integration
//!
//! Session energy is computed from the power samples, not read back from the
//! meter's own counter: each new sample extends the stream's cumulative
//! energy by the trapezoid between it and the previous sample. Streams are
//! per (session, channel); heater and fan integrate independently and are
//! never summed here.

use crate::session::Measurement;
use chrono::{DateTime, Utc};

/// Cumulative session energy in kWh for a new (timestamp, power) sample.
///
/// With no prior measurement the stream seeds at zero. Otherwise the
/// increment is the endpoint-average power over the interval:
/// `(prev.power + power) / 2 * dt_hours / 1000`. A non-positive interval
/// (host clock stepped) contributes nothing, so the result never decreases
/// within a stream.
pub fn cumulative_energy_kwh(
    previous: Option<&Measurement>,
    timestamp: DateTime<Utc>,
    power_w: f64,
) -> f64 {
    let Some(prev) = previous else {
        return 0.0;
    };

    let delta_hours = (timestamp - prev.timestamp).num_milliseconds() as f64 / 3_600_000.0;
    if delta_hours <= 0.0 {
        return prev.energy_kwh;
    }

    let avg_power_w = (prev.power_w + power_w) / 2.0;
    prev.energy_kwh + (avg_power_w * delta_hours) / 1000.0
}
