//! Serial line parameters and timing computation
//!
//! The simulator has no real UART, but every timing decision - the silence
//! interval that delimits frames and the pacing of outbound bytes - is
//! derived from the serial parameters a real RTU link would use.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    HIGH_BAUD_SILENCE_MS, HIGH_BAUD_THRESHOLD, MIN_SILENCE_MS, SILENCE_CHAR_FACTOR,
};
use crate::error::{RtuSimError, RtuSimResult};

/// Serial line parameters of the emulated RTU link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialParams {
    /// Baud rate in bits per second
    pub baud_rate: u32,
    /// Data bits per character (commonly 7 or 8)
    pub data_bits: u8,
    /// Whether a parity bit is transmitted
    pub parity: bool,
    /// Stop bits per character (1, 1.5 or 2)
    pub stop_bits: f32,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: false,
            stop_bits: 1.0,
        }
    }
}

impl SerialParams {
    /// Validate the parameters, failing fast on values that would produce
    /// nonsensical timing
    pub fn validate(&self) -> RtuSimResult<()> {
        if self.baud_rate == 0 {
            return Err(RtuSimError::config("baud rate must be positive"));
        }
        if self.data_bits == 0 {
            return Err(RtuSimError::config("data bits must be positive"));
        }
        if self.stop_bits <= 0.0 {
            return Err(RtuSimError::config("stop bits must be positive"));
        }
        Ok(())
    }

    /// Bits on the wire per character: start bit + data bits + optional
    /// parity bit + stop bits
    pub fn bits_per_char(&self) -> f64 {
        1.0 + f64::from(self.data_bits)
            + if self.parity { 1.0 } else { 0.0 }
            + f64::from(self.stop_bits)
    }

    /// Time to transmit one character, in milliseconds
    pub fn char_time_ms(&self) -> f64 {
        self.bits_per_char() / f64::from(self.baud_rate) * 1000.0
    }

    /// Inter-frame silence interval for this line
    ///
    /// 3.5 character times, or a fixed nominal value above 19200 baud, with
    /// an unconditional 10 ms floor either way.
    pub fn silence_interval(&self) -> Duration {
        let nominal_ms = if self.baud_rate > HIGH_BAUD_THRESHOLD {
            HIGH_BAUD_SILENCE_MS
        } else {
            self.char_time_ms() * SILENCE_CHAR_FACTOR
        };
        let ms = nominal_ms.max(MIN_SILENCE_MS);
        Duration::from_micros((ms * 1000.0) as u64)
    }

    /// Time a real UART at these parameters would need to transmit
    /// `byte_count` bytes
    pub fn transmission_delay(&self, byte_count: usize) -> Duration {
        let ms = self.bits_per_char() * byte_count as f64 * 1000.0 / f64::from(self.baud_rate);
        if ms <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_micros((ms * 1000.0) as u64)
        }
    }
}

/// Serial parameters shared between the reader, the writer and the frame
/// assembler
///
/// The parameters are owned by the slave session, not by any single
/// connection; updating them takes effect on the next timing computation
/// without touching bytes already pending.
#[derive(Debug, Clone, Default)]
pub struct SharedSerialParams {
    inner: Arc<Mutex<SerialParams>>,
}

impl SharedSerialParams {
    pub fn new(params: SerialParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(params)),
        }
    }

    /// Snapshot of the current parameters
    pub fn get(&self) -> SerialParams {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the parameters, failing fast on invalid values
    pub fn set(&self, params: SerialParams) -> RtuSimResult<()> {
        params.validate()?;
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = params;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn test_default_params_are_valid() {
        let params = SerialParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.data_bits, 8);
        assert!(!params.parity);
        assert_eq!(params.stop_bits, 1.0);
    }

    #[test]
    fn test_zero_baud_rate_rejected() {
        let params = SerialParams {
            baud_rate: 0,
            ..Default::default()
        };
        let result = params.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("baud rate"));
    }

    #[test]
    fn test_zero_data_bits_rejected() {
        let params = SerialParams {
            data_bits: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_non_positive_stop_bits_rejected() {
        let params = SerialParams {
            stop_bits: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = SerialParams {
            stop_bits: -1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    // ========================================================================
    // Silence Interval Tests
    // ========================================================================

    #[test]
    fn test_silence_interval_9600_hits_floor() {
        // 10 bits/char at 9600 baud: 3.5 chars = ~3.65 ms, below the floor
        let params = SerialParams::default();
        assert_eq!(params.silence_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_silence_interval_high_baud_branch_hits_floor() {
        // Above 19200 baud the nominal interval is the fixed 2 ms value,
        // which the floor then overrides
        let params = SerialParams {
            baud_rate: 38400,
            ..Default::default()
        };
        assert_eq!(params.silence_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_silence_interval_slow_line() {
        // 10 bits/char at 1200 baud: char time 8.333 ms, 3.5 chars = 29.166 ms
        let params = SerialParams {
            baud_rate: 1200,
            ..Default::default()
        };
        assert_eq!(params.silence_interval(), Duration::from_micros(29_166));
    }

    #[test]
    fn test_silence_interval_with_parity_and_two_stop_bits() {
        // 1 + 8 + 1 + 2 = 12 bits/char at 1200 baud: 10 ms/char, 35 ms gap
        let params = SerialParams {
            baud_rate: 1200,
            data_bits: 8,
            parity: true,
            stop_bits: 2.0,
        };
        assert_eq!(params.silence_interval(), Duration::from_millis(35));
    }

    // ========================================================================
    // Transmission Delay Tests
    // ========================================================================

    #[test]
    fn test_transmission_delay_typical_frame() {
        // 8 bytes of 10 bits each at 9600 baud = 8.333 ms
        let params = SerialParams::default();
        assert_eq!(
            params.transmission_delay(8),
            Duration::from_micros(8_333)
        );
    }

    #[test]
    fn test_transmission_delay_zero_bytes() {
        let params = SerialParams::default();
        assert_eq!(params.transmission_delay(0), Duration::ZERO);
    }

    #[test]
    fn test_transmission_delay_scales_with_byte_count() {
        // 10 bits/char at 1000 baud: exactly 10 ms per byte
        let params = SerialParams {
            baud_rate: 1000,
            ..Default::default()
        };
        assert_eq!(params.transmission_delay(1), Duration::from_millis(10));
        assert_eq!(params.transmission_delay(10), Duration::from_millis(100));
    }

    // ========================================================================
    // Shared Parameter Tests
    // ========================================================================

    #[test]
    fn test_shared_params_set_and_get() {
        let shared = SharedSerialParams::new(SerialParams::default());
        assert_eq!(shared.get().baud_rate, 9600);

        let updated = SerialParams {
            baud_rate: 19200,
            ..Default::default()
        };
        shared.set(updated).expect("valid params");
        assert_eq!(shared.get().baud_rate, 19200);
    }

    #[test]
    fn test_shared_params_rejects_invalid_update() {
        let shared = SharedSerialParams::new(SerialParams::default());
        let result = shared.set(SerialParams {
            baud_rate: 0,
            ..Default::default()
        });
        assert!(result.is_err());
        // The previous parameters stay in effect
        assert_eq!(shared.get().baud_rate, 9600);
    }
}
