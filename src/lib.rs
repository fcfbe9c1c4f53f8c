//! Thermorig: Modbus RTU acquisition for refrigerated-truck thermal tests
//!
//! A driver and acquisition engine for the electrical side of a thermal
//! dissipation test rig: power meters on an RS-485 bus report what the test
//! heater and circulation fan consume, and a background task samples them
//! for the duration of a test session.
//!
//! The crate is organized as:
//! - `frame`: Modbus RTU encoding, CRC and response parsing
//! - `registers`: per-meter-family register maps and value decoding
//! - `transport`: the serial port and request/response exchanges
//! - `meter`: typed quantity reads with plausibility bounds
//! - `integrator`: trapezoidal session-energy accumulation
//! - `engine`: session lifecycle and the concurrent polling loop
//! - `session` / `store`: the data model and the storage seam
//! - `config`, `logging`, `error`: the ambient plumbing

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod integrator;
pub mod logging;
pub mod meter;
pub mod registers;
pub mod session;
pub mod store;
pub mod transport;

pub use config::Config;
pub use engine::AcquisitionEngine;
pub use error::{Result, ThermorigError};
