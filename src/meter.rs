//! Typed device reader over the serial transport and register map
//!
//! Each accessor reads one physical quantity for a logical channel, decodes
//! it per the register map and applies a plausibility bound: a structurally
//! valid frame carrying a physically impossible value is evidence of an
//! address or endianness mis-mapping, not a real reading, and is treated
//! exactly like a failed read.

use crate::config::{Config, MeterConfig};
use crate::logging::get_logger;
use crate::registers::{Channel, MeterFamily, Quantity, register_spec};
use crate::transport::SerialTransport;
use async_trait::async_trait;
use std::time::Duration;

/// One channel's worth of decoded values for a polling cycle.
///
/// Power is mandatory; voltage and frequency are best-effort so a cycle can
/// still be persisted when secondary fields fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    pub power_w: f64,
    pub voltage_v: Option<f64>,
    pub frequency_hz: Option<f64>,
}

/// Seam between the acquisition engine and the physical meter, so the engine
/// is testable against a mock device.
#[async_trait]
pub trait ChannelReader: Send {
    /// Open the underlying transport; `false` when the device is absent
    async fn connect(&mut self) -> bool;

    /// Release the underlying transport
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Read power (required) plus best-effort voltage and frequency for one
    /// channel. `None` iff power could not be decoded.
    async fn read_all(&mut self, channel: Channel) -> Option<ChannelReading>;
}

/// Plausibility bound per quantity. Frequency accepts an exact 0 (meter
/// reports 0 Hz with no load) or the mains band.
pub fn plausible(quantity: Quantity, value: f64) -> bool {
    match quantity {
        Quantity::Voltage => (0.0..=500.0).contains(&value),
        Quantity::Current => (0.0..=1000.0).contains(&value),
        Quantity::ActivePower => (0.0..=100_000.0).contains(&value),
        Quantity::Energy => (0.0..=1_000_000.0).contains(&value),
        Quantity::Frequency => value == 0.0 || (45.0..=55.0).contains(&value),
    }
}

/// Reader for one meter family over the shared serial bus
pub struct MeterReader {
    transport: SerialTransport,
    family: MeterFamily,
    meter: MeterConfig,
    logger: crate::logging::StructuredLogger,
}

impl MeterReader {
    /// Build a reader (and its transport) from configuration
    pub fn new(config: &Config) -> Self {
        let transport = SerialTransport::new(
            config.serial.clone(),
            config.acquisition.max_retries,
            Duration::from_secs_f64(config.acquisition.retry_delay_secs),
        );
        Self {
            transport,
            family: config.meter.family,
            meter: config.meter.clone(),
            logger: get_logger("meter"),
        }
    }

    /// Read one quantity for one channel. `None` on register-map gaps,
    /// transport failure or an implausible decode.
    pub async fn read_quantity(&mut self, channel: Channel, quantity: Quantity) -> Option<f64> {
        let spec = register_spec(self.family, channel, quantity)?;
        let slave_id = self.meter.slave_id(channel);

        let words = self
            .transport
            .read_registers_with_retry(spec.function, spec.offset, spec.count, slave_id)
            .await?;

        let value = spec.decode(&words)?;

        if !plausible(quantity, value) {
            self.logger.warn(&format!(
                "Implausible {} on {}: {} (register {}, Modbus address {}, slave {})",
                quantity,
                channel,
                value,
                spec.offset,
                spec.modbus_address(),
                slave_id
            ));
            return None;
        }

        self.logger
            .debug(&format!("{} {}: {}", channel, quantity, value));
        Some(value)
    }

    pub async fn read_voltage(&mut self, channel: Channel) -> Option<f64> {
        self.read_quantity(channel, Quantity::Voltage).await
    }

    pub async fn read_current(&mut self, channel: Channel) -> Option<f64> {
        self.read_quantity(channel, Quantity::Current).await
    }

    pub async fn read_power(&mut self, channel: Channel) -> Option<f64> {
        self.read_quantity(channel, Quantity::ActivePower).await
    }

    pub async fn read_energy(&mut self, channel: Channel) -> Option<f64> {
        self.read_quantity(channel, Quantity::Energy).await
    }

    pub async fn read_frequency(&mut self, channel: Channel) -> Option<f64> {
        self.read_quantity(channel, Quantity::Frequency).await
    }
}

#[async_trait]
impl ChannelReader for MeterReader {
    async fn connect(&mut self) -> bool {
        self.transport.connect().await
    }

    fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn read_all(&mut self, channel: Channel) -> Option<ChannelReading> {
        let power_w = self.read_power(channel).await?;
        let voltage_v = self.read_voltage(channel).await;
        let frequency_hz = self.read_frequency(channel).await;

        Some(ChannelReading {
            power_w,
            voltage_v,
            frequency_hz,
        })
    }
}
