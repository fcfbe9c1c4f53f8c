//! Modbus RTU frame codec
//!
//! Pure functions for building read requests and parsing/validating
//! responses, including the Modbus CRC16. Register data is big-endian on the
//! wire while the trailing CRC is little-endian (low byte first) - that
//! asymmetry is part of the protocol and preserved exactly here.

use thiserror::Error;

/// Read Holding Registers (4X addressing)
pub const FUNC_READ_HOLDING: u8 = 0x03;
/// Read Input Registers (3X addressing)
pub const FUNC_READ_INPUT: u8 = 0x04;
/// Set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Structural violations detected while parsing a response frame.
///
/// Parsing never panics on malformed input; every violation maps to one of
/// these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("response too short: {len} bytes")]
    TooShort { len: usize },

    #[error("slave id mismatch: expected {expected}, received {received}")]
    SlaveMismatch { expected: u8, received: u8 },

    #[error("function code mismatch: expected {expected:#04x}, received {received:#04x}")]
    FunctionMismatch { expected: u8, received: u8 },

    #[error("device exception response: code {code}")]
    Exception { code: u8 },

    #[error("CRC mismatch: computed {computed:#06x}, received {received:#06x}")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("incomplete payload: byte count {byte_count}, frame length {len}")]
    Incomplete { byte_count: usize, len: usize },
}

/// Word order of a 32-bit float split across two consecutive registers.
///
/// The two supported meter families disagree on which word arrives first;
/// the order is a property of the register map, never assumed universal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    /// First register carries the most significant word
    HighFirst,
    /// First register carries the least significant word (RS-PRO as observed
    /// on the wire, deviating from its datasheet)
    LowFirst,
}

/// Compute the Modbus RTU CRC16 (polynomial 0xA001, initial value 0xFFFF,
/// LSB-first bit processing).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Build a read request frame: 6-byte header followed by CRC low, CRC high.
pub fn build_read_request(
    slave_id: u8,
    function_code: u8,
    start_address: u16,
    register_count: u16,
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave_id);
    frame.push(function_code);
    frame.push((start_address >> 8) as u8);
    frame.push((start_address & 0xFF) as u8);
    frame.push((register_count >> 8) as u8);
    frame.push((register_count & 0xFF) as u8);

    let crc = crc16(&frame);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);

    frame
}

/// Validate a response frame and extract its 16-bit big-endian data words.
pub fn parse_response(
    data: &[u8],
    expected_slave_id: u8,
    expected_function_code: u8,
) -> std::result::Result<Vec<u16>, FrameError> {
    if data.len() < 4 {
        return Err(FrameError::TooShort { len: data.len() });
    }

    if data[0] != expected_slave_id {
        return Err(FrameError::SlaveMismatch {
            expected: expected_slave_id,
            received: data[0],
        });
    }

    if data[1] != expected_function_code {
        if data[1] == expected_function_code | EXCEPTION_FLAG {
            return Err(FrameError::Exception { code: data[2] });
        }
        return Err(FrameError::FunctionMismatch {
            expected: expected_function_code,
            received: data[1],
        });
    }

    // Trailing CRC is low byte then high byte
    let received_crc = (u16::from(data[data.len() - 1]) << 8) | u16::from(data[data.len() - 2]);
    let computed_crc = crc16(&data[..data.len() - 2]);
    if received_crc != computed_crc {
        return Err(FrameError::CrcMismatch {
            computed: computed_crc,
            received: received_crc,
        });
    }

    let byte_count = data[2] as usize;
    if data.len() < 3 + byte_count + 2 {
        return Err(FrameError::Incomplete {
            byte_count,
            len: data.len(),
        });
    }

    let mut registers = Vec::with_capacity(byte_count / 2);
    let mut i = 0;
    while i + 1 < byte_count {
        registers.push((u16::from(data[3 + i]) << 8) | u16::from(data[3 + i + 1]));
        i += 2;
    }

    Ok(registers)
}

/// Check whether an accumulating receive buffer holds a structurally
/// complete frame for the given function code. Used by the transport while
/// polling the serial input; completeness here is by declared byte count,
/// CRC validation happens in [`parse_response`].
pub fn response_complete(data: &[u8], function_code: u8) -> bool {
    if data.len() < 4 {
        return false;
    }
    if data[1] == function_code {
        let expected = 3 + data[2] as usize + 2;
        return data.len() >= expected;
    }
    if data[1] == function_code | EXCEPTION_FLAG {
        // slave id + function + exception code + CRC
        return data.len() >= 5;
    }
    false
}

/// Combine two 16-bit registers into an IEEE-754 32-bit float under the
/// declared word order.
pub fn decode_float32(word_a: u16, word_b: u16, order: WordOrder) -> f32 {
    let bits = match order {
        WordOrder::HighFirst => (u32::from(word_a) << 16) | u32::from(word_b),
        WordOrder::LowFirst => (u32::from(word_b) << 16) | u32::from(word_a),
    };
    f32::from_bits(bits)
}
