//! Register maps for the supported power meter families
//!
//! Pure configuration data: for each meter family, logical channel and
//! physical quantity, the register offset, width, function code, decoding
//! convention and unit scale. This table is the mechanism by which the same
//! transport and codec serve two physically different meters.
//!
//! Offsets here are 0-based register offsets. The externally documented
//! Modbus address is `offset + 30001` for input registers and
//! `offset + 40001` for holding registers; diagnostics report both.
//!
//! The RS-PRO table was verified against the bench unit (stock no. 236-9297)
//! and deviates from the vendor datasheet in two places: the 32-bit floats
//! arrive low word first, and active power is reported in kW. Treat these
//! entries as hardware-validated configuration, not as a universal Modbus
//! convention.

use crate::frame::{FUNC_READ_HOLDING, FUNC_READ_INPUT, WordOrder};
use serde::{Deserialize, Serialize};

/// Logical acquisition channel. On the RS-PRO this selects a measurement
/// phase of one meter; on the SDM120 it selects a meter on the daisy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Heater,
    Fan,
}

impl Channel {
    /// All channels in fixed polling order
    pub const ALL: [Channel; 2] = [Channel::Heater, Channel::Fan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Heater => "heater",
            Channel::Fan => "fan",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical quantity addressable on a meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Voltage,
    Current,
    ActivePower,
    Energy,
    Frequency,
}

impl Quantity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::Voltage => "voltage",
            Quantity::Current => "current",
            Quantity::ActivePower => "power",
            Quantity::Energy => "energy",
            Quantity::Frequency => "frequency",
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported meter families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterFamily {
    /// RS-PRO DIN-rail multifunction meter (236-9297), both channels as
    /// phases of a single slave
    RsPro,
    /// Eastron SDM120, one meter per channel on the shared bus
    Sdm120,
}

/// Decoding convention for a register block
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueEncoding {
    /// Two registers holding an IEEE-754 float in the given word order
    Float32(WordOrder),
    /// Single register holding an unsigned integer
    U16,
    /// Two registers holding a 32-bit unsigned integer, high word first
    U32,
}

/// One entry of a register map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterSpec {
    /// 0-based register offset
    pub offset: u16,
    /// Number of consecutive registers
    pub count: u16,
    /// Modbus function code (0x04 input, 0x03 holding)
    pub function: u8,
    pub encoding: ValueEncoding,
    /// Multiplier applied after decoding to reach the canonical unit
    /// (V, A, W, kWh, Hz)
    pub scale: f64,
}

impl RegisterSpec {
    const fn input_float(offset: u16, order: WordOrder, scale: f64) -> Self {
        RegisterSpec {
            offset,
            count: 2,
            function: FUNC_READ_INPUT,
            encoding: ValueEncoding::Float32(order),
            scale,
        }
    }

    const fn holding_u16(offset: u16, scale: f64) -> Self {
        RegisterSpec {
            offset,
            count: 1,
            function: FUNC_READ_HOLDING,
            encoding: ValueEncoding::U16,
            scale,
        }
    }

    const fn holding_u32(offset: u16, scale: f64) -> Self {
        RegisterSpec {
            offset,
            count: 2,
            function: FUNC_READ_HOLDING,
            encoding: ValueEncoding::U32,
            scale,
        }
    }

    /// Externally documented Modbus address of the first register
    /// (offset + 30001 for input registers, offset + 40001 for holding)
    pub fn modbus_address(&self) -> u32 {
        let base = if self.function == FUNC_READ_INPUT {
            30001
        } else {
            40001
        };
        base + u32::from(self.offset)
    }

    /// Decode raw register words into a scaled value. Returns `None` when
    /// the word count does not match the entry's width.
    pub fn decode(&self, words: &[u16]) -> Option<f64> {
        if words.len() != self.count as usize {
            return None;
        }
        let raw = match self.encoding {
            ValueEncoding::Float32(order) => {
                f64::from(crate::frame::decode_float32(words[0], words[1], order))
            }
            ValueEncoding::U16 => f64::from(words[0]),
            ValueEncoding::U32 => {
                f64::from((u32::from(words[0]) << 16) | u32::from(words[1]))
            }
        };
        Some(raw * self.scale)
    }
}

const RSPRO_ORDER: WordOrder = WordOrder::LowFirst;

/// Look up the register spec for a (family, channel, quantity) triple.
/// `None` means the family does not expose that quantity on that channel.
pub fn register_spec(
    family: MeterFamily,
    channel: Channel,
    quantity: Quantity,
) -> Option<RegisterSpec> {
    match family {
        MeterFamily::RsPro => rspro_spec(channel, quantity),
        MeterFamily::Sdm120 => sdm120_spec(quantity),
    }
}

/// RS-PRO 236-9297: input registers, float32 low word first.
/// Phase 1 drives the heater circuit, phase 2 the evaporator fan.
fn rspro_spec(channel: Channel, quantity: Quantity) -> Option<RegisterSpec> {
    let spec = match (channel, quantity) {
        // Modbus 30001 / 30003: line-to-neutral volts
        (Channel::Heater, Quantity::Voltage) => RegisterSpec::input_float(0x0000, RSPRO_ORDER, 1.0),
        (Channel::Fan, Quantity::Voltage) => RegisterSpec::input_float(0x0002, RSPRO_ORDER, 1.0),
        // Modbus 30007 / 30009: phase current
        (Channel::Heater, Quantity::Current) => RegisterSpec::input_float(0x0006, RSPRO_ORDER, 1.0),
        (Channel::Fan, Quantity::Current) => RegisterSpec::input_float(0x0008, RSPRO_ORDER, 1.0),
        // Modbus 30017 / 30019: active power, reported in kW
        (Channel::Heater, Quantity::ActivePower) => {
            RegisterSpec::input_float(0x0010, RSPRO_ORDER, 1000.0)
        }
        (Channel::Fan, Quantity::ActivePower) => {
            RegisterSpec::input_float(0x0012, RSPRO_ORDER, 1000.0)
        }
        // Per-phase energy counters as verified on the bench unit
        (Channel::Heater, Quantity::Energy) => RegisterSpec::input_float(0x016A, RSPRO_ORDER, 1.0),
        (Channel::Fan, Quantity::Energy) => RegisterSpec::input_float(0x001A, RSPRO_ORDER, 1.0),
        // Modbus 30071: supply frequency, shared across phases
        (_, Quantity::Frequency) => RegisterSpec::input_float(0x0046, RSPRO_ORDER, 1.0),
    };
    Some(spec)
}

/// Eastron SDM120: holding-register integers, one meter per channel so the
/// map is channel-independent. Current and frequency are not mapped.
fn sdm120_spec(quantity: Quantity) -> Option<RegisterSpec> {
    match quantity {
        // Volts with one implied decimal
        Quantity::Voltage => Some(RegisterSpec::holding_u16(0x0000, 0.1)),
        // Watts, no decimals
        Quantity::ActivePower => Some(RegisterSpec::holding_u16(0x0006, 1.0)),
        // Total active energy in Wh x 100 across two registers
        Quantity::Energy => Some(RegisterSpec::holding_u32(0x0048, 1.0 / 100_000.0)),
        Quantity::Current | Quantity::Frequency => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rspro_power_map() {
        let spec = register_spec(MeterFamily::RsPro, Channel::Heater, Quantity::ActivePower)
            .unwrap();
        assert_eq!(spec.offset, 0x0010);
        assert_eq!(spec.count, 2);
        assert_eq!(spec.function, FUNC_READ_INPUT);
        assert_eq!(spec.modbus_address(), 30017);
        assert_eq!(spec.scale, 1000.0);

        let fan = register_spec(MeterFamily::RsPro, Channel::Fan, Quantity::ActivePower).unwrap();
        assert_eq!(fan.offset, 0x0012);
        assert_eq!(fan.modbus_address(), 30019);
    }

    #[test]
    fn test_rspro_decode_applies_kw_scale() {
        let spec =
            register_spec(MeterFamily::RsPro, Channel::Heater, Quantity::ActivePower).unwrap();
        // 1.5 kW == 0x3FC00000, low word first on the wire
        let value = spec.decode(&[0x0000, 0x3FC0]).unwrap();
        assert!((value - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn test_sdm120_map() {
        let voltage = register_spec(MeterFamily::Sdm120, Channel::Fan, Quantity::Voltage).unwrap();
        assert_eq!(voltage.function, FUNC_READ_HOLDING);
        assert_eq!(voltage.modbus_address(), 40001);
        // 2305 raw -> 230.5 V
        assert!((voltage.decode(&[2305]).unwrap() - 230.5).abs() < 1e-9);

        let energy = register_spec(MeterFamily::Sdm120, Channel::Fan, Quantity::Energy).unwrap();
        assert_eq!(energy.count, 2);
        // 1 234 567 raw (Wh x 100) -> 12.34567 kWh
        let value = energy.decode(&[0x0012, 0xD687]).unwrap();
        assert!((value - 12.34567).abs() < 1e-9);

        assert!(register_spec(MeterFamily::Sdm120, Channel::Heater, Quantity::Current).is_none());
        assert!(register_spec(MeterFamily::Sdm120, Channel::Heater, Quantity::Frequency).is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_width() {
        let spec = register_spec(MeterFamily::RsPro, Channel::Heater, Quantity::Voltage).unwrap();
        assert!(spec.decode(&[0x0000]).is_none());
        assert!(spec.decode(&[0, 0, 0]).is_none());
    }
}
