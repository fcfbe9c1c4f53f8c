#![no_main]
use libfuzzer_sys::fuzz_target;

use thermorig::frame::{
    FUNC_READ_HOLDING, FUNC_READ_INPUT, WordOrder, decode_float32, parse_response,
    response_complete,
};

fuzz_target!(|data: &[u8]| {
    // Response parsing must never panic on arbitrary byte streams
    for function in [FUNC_READ_HOLDING, FUNC_READ_INPUT] {
        let _ = response_complete(data, function);
        for slave_id in [0u8, 1, 247] {
            let _ = parse_response(data, slave_id, function);
        }
    }

    // Exercise the float decoder on the first two register words
    if data.len() >= 4 {
        let w0 = u16::from_be_bytes([data[0], data[1]]);
        let w1 = u16::from_be_bytes([data[2], data[3]]);
        let _ = decode_float32(w0, w1, WordOrder::HighFirst);
        let _ = decode_float32(w0, w1, WordOrder::LowFirst);
    }
});
