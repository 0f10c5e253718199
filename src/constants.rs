//! Modbus RTU protocol and timing constants
//!
//! Frame-size limits follow the Modbus specification: the RS485 ADU is
//! capped at 256 bytes (slave address + 253-byte PDU + 2-byte CRC).

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Shortest meaningful RTU frame: slave address + function code + 2-byte CRC
pub const MIN_FRAME_LEN: usize = 4;

/// Total length of the fixed-size master requests (FC01-FC06)
///
/// Address(1) + Function(1) + Start Address(2) + Quantity/Value(2) + CRC(2)
pub const FIXED_REQUEST_LEN: usize = 8;

/// Header length of FC15/FC16 requests up to and including the byte-count
/// field: Address(1) + Function(1) + Start(2) + Quantity(2) + ByteCount(1)
pub const MULTI_WRITE_HEADER_LEN: usize = 7;

/// Fixed overhead of FC15/FC16 requests around the variable data section:
/// 7-byte header + 2-byte CRC
pub const MULTI_WRITE_OVERHEAD: usize = 9;

/// Maximum Modbus RTU frame size (ADU limit)
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Hard cap on pending unframed bytes
///
/// When the receive buffer exceeds this at the moment the silence timeout
/// fires, the whole buffer is discarded: a garbage-only stream must never
/// grow the buffer without bound.
pub const RECEIVE_BUFFER_CAP: usize = 4096;

// ============================================================================
// Timing Constants
// ============================================================================

/// Inter-frame gap expressed in character times (the classic "3.5 chars")
pub const SILENCE_CHAR_FACTOR: f64 = 3.5;

/// Baud rates above this use the fixed high-speed silence interval instead
/// of the 3.5-character computation
pub const HIGH_BAUD_THRESHOLD: u32 = 19_200;

/// Nominal silence interval for baud rates above [`HIGH_BAUD_THRESHOLD`]
pub const HIGH_BAUD_SILENCE_MS: f64 = 2.0;

/// Unconditional floor for the silence interval
///
/// Coarse-grained timers cannot reliably fire sooner, and a premature
/// timeout would split genuine frames.
pub const MIN_SILENCE_MS: f64 = 10.0;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Defaults
// ============================================================================

/// Default TCP port the slave listens on
pub const DEFAULT_PORT: u16 = 8889;
