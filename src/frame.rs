//! RTU frame validation and length prediction
//!
//! RTU frames carry no length or delimiter field. Frame boundaries are
//! inferred from silence on the wire combined with the expected length of
//! each request type, and confirmed by the trailing CRC-16 checksum.

use crc::{Crc, CRC_16_MODBUS};

use crate::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, FIXED_REQUEST_LEN, MIN_FRAME_LEN, MULTI_WRITE_HEADER_LEN,
    MULTI_WRITE_OVERHEAD,
};

/// CRC calculator for RTU (seed 0xFFFF, reflected polynomial 0xA001)
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Calculate the CRC-16/Modbus checksum over `data`
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Verify the trailing CRC of a candidate frame
///
/// The checksum is transmitted low byte first. Anything shorter than the
/// minimum frame length cannot carry a meaningful checksum and fails.
pub fn verify_crc(frame: &[u8]) -> bool {
    if frame.len() < MIN_FRAME_LEN {
        return false;
    }
    let split = frame.len() - 2;
    frame[split..] == crc16(&frame[..split]).to_le_bytes()
}

/// Append the CRC-16 of `frame` to it, low byte first
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Outcome of length prediction on a byte prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// Not enough bytes yet to decide
    NeedMore,
    /// Unknown function code: the stream is desynchronised at this offset
    Invalid,
    /// Total frame length in bytes
    Exact(usize),
}

/// Predict the total length of the master request starting at `buf[0]`
///
/// The function code (second byte) selects the request layout:
/// FC01-FC06 are fixed 8-byte requests; FC15/FC16 carry a byte-count field
/// at index 6 that sizes the variable data section.
pub fn expected_request_length(buf: &[u8]) -> FrameLength {
    if buf.len() < 2 {
        return FrameLength::NeedMore;
    }

    match buf[1] {
        FC_READ_COILS
        | FC_READ_DISCRETE_INPUTS
        | FC_READ_HOLDING_REGISTERS
        | FC_READ_INPUT_REGISTERS
        | FC_WRITE_SINGLE_COIL
        | FC_WRITE_SINGLE_REGISTER => FrameLength::Exact(FIXED_REQUEST_LEN),

        FC_WRITE_MULTIPLE_COILS | FC_WRITE_MULTIPLE_REGISTERS => {
            if buf.len() < MULTI_WRITE_HEADER_LEN {
                FrameLength::NeedMore
            } else {
                FrameLength::Exact(MULTI_WRITE_OVERHEAD + buf[6] as usize)
            }
        },

        _ => FrameLength::Invalid,
    }
}
