//! Serial transport for the Modbus RTU bus
//!
//! Owns the open serial port. One request/response exchange at a time: the
//! engine enforces single-talker access by construction, so no locking
//! happens at this level. All read failures degrade to `None` and a log
//! line; an absent or unplugged device is an expected operating condition.

use crate::config::SerialConfig;
use crate::frame::{build_read_request, parse_response, response_complete};
use crate::logging::get_logger;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, sleep, timeout};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialStream, StopBits};

/// Serial transport owning the port handle
pub struct SerialTransport {
    port: Option<SerialStream>,
    config: SerialConfig,
    max_retries: u32,
    retry_delay: Duration,
    logger: crate::logging::StructuredLogger,
}

impl SerialTransport {
    /// Create a transport; the port stays closed until [`connect`] succeeds.
    ///
    /// [`connect`]: SerialTransport::connect
    pub fn new(config: SerialConfig, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            port: None,
            config,
            max_retries,
            retry_delay,
            logger: get_logger("transport"),
        }
    }

    /// Open the serial device with the configured parameters, clear both
    /// buffers and wait the stabilization delay. Returns `false` on failure
    /// rather than an error: a missing device is not exceptional.
    pub async fn connect(&mut self) -> bool {
        let builder = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(data_bits(self.config.data_bits))
            .parity(parity(&self.config.parity))
            .stop_bits(stop_bits(self.config.stop_bits))
            .timeout(self.config.timeout());

        match SerialStream::open(&builder) {
            Ok(stream) => {
                if let Err(e) = stream.clear(ClearBuffer::All) {
                    self.logger
                        .debug(&format!("Could not clear serial buffers: {}", e));
                }
                self.port = Some(stream);
                self.logger.info(&format!(
                    "Serial port {} open ({} baud)",
                    self.config.port, self.config.baud_rate
                ));

                let delay = self.config.post_connect_delay();
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                true
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "Cannot open serial port {}: {} (device not present?)",
                    self.config.port, e
                ));
                false
            }
        }
    }

    /// Close the serial port
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            self.logger.info("Serial port closed");
        }
    }

    /// Whether the port is currently open
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// One request/response exchange: clear the input buffer, write the
    /// encoded request, accumulate response bytes until a structurally
    /// complete frame or the timeout, then validate and extract the
    /// register words. Any failure logs and yields `None`.
    pub async fn read_registers(
        &mut self,
        function: u8,
        offset: u16,
        count: u16,
        slave_id: u8,
    ) -> Option<Vec<u16>> {
        let read_timeout = self.config.timeout();
        let Some(port) = self.port.as_mut() else {
            self.logger.warn("Serial port not connected");
            return None;
        };

        if let Err(e) = port.clear(ClearBuffer::Input) {
            self.logger
                .debug(&format!("Could not clear input buffer: {}", e));
        }

        let request = build_read_request(slave_id, function, offset, count);
        if let Err(e) = port.write_all(&request).await {
            self.logger
                .warn(&format!("Write failed for register {}: {}", offset, e));
            return None;
        }
        if let Err(e) = port.flush().await {
            self.logger.debug(&format!("Flush failed: {}", e));
        }

        let deadline = Instant::now() + read_timeout;
        let mut response: Vec<u8> = Vec::with_capacity(16);
        let mut chunk = [0u8; 64];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, port.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&chunk[..n]);
                    if response_complete(&response, function) {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    self.logger
                        .warn(&format!("Read failed for register {}: {}", offset, e));
                    return None;
                }
                Err(_) => break,
            }
        }

        if response.is_empty() {
            self.logger
                .warn(&format!("No response for register {}", offset));
            return None;
        }

        self.logger.trace(&format!(
            "Raw response (reg {}): {} ({} bytes)",
            offset,
            response
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
            response.len()
        ));

        match parse_response(&response, slave_id, function) {
            Ok(registers) => Some(registers),
            Err(e) => {
                self.logger
                    .warn(&format!("Bad response for register {}: {}", offset, e));
                None
            }
        }
    }

    /// Per-field retry wrapper: up to `max_retries` attempts, with the
    /// inter-retry delay scaled by 1.5 on retries after the first. Exhausting
    /// retries yields `None`, never an error.
    pub async fn read_registers_with_retry(
        &mut self,
        function: u8,
        offset: u16,
        count: u16,
        slave_id: u8,
    ) -> Option<Vec<u16>> {
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                sleep(self.retry_delay.mul_f64(1.5)).await;
            }
            if let Some(registers) = self.read_registers(function, offset, count, slave_id).await {
                if attempt > 0 {
                    self.logger.debug(&format!(
                        "Register {} read after {} retries",
                        offset, attempt
                    ));
                }
                return Some(registers);
            }
        }
        self.logger.warn(&format!(
            "Retries exhausted for register {} (slave {})",
            offset, slave_id
        ));
        None
    }
}

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn parity(name: &str) -> Parity {
    match name.to_lowercase().as_str() {
        "even" | "e" => Parity::Even,
        "odd" | "o" => Parity::Odd,
        _ => Parity::None,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_missing_device_returns_false() {
        let config = SerialConfig {
            port: "/dev/thermorig-no-such-port".to_string(),
            post_connect_delay_secs: 0.0,
            ..SerialConfig::default()
        };
        let mut transport = SerialTransport::new(config, 3, Duration::from_millis(10));
        assert!(!transport.is_connected());
        assert!(!transport.connect().await);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_read_without_connection_yields_none() {
        let config = SerialConfig::default();
        let mut transport = SerialTransport::new(config, 1, Duration::from_millis(10));
        assert!(
            transport
                .read_registers(crate::frame::FUNC_READ_INPUT, 0x0000, 2, 1)
                .await
                .is_none()
        );
    }

    #[test]
    fn test_serial_parameter_mapping() {
        assert_eq!(parity("N"), Parity::None);
        assert_eq!(parity("even"), Parity::Even);
        assert_eq!(parity("O"), Parity::Odd);
        assert_eq!(stop_bits(2), StopBits::Two);
        assert_eq!(data_bits(8), DataBits::Eight);
    }
}
