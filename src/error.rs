//! Error types for the RTU slave simulator

use thiserror::Error;

/// Result type for rtusim operations
pub type RtuSimResult<T> = std::result::Result<T, RtuSimError>;

/// Errors surfaced by the simulator
///
/// Malformed headers, CRC mismatches and buffer overflows are *not* errors:
/// the assembler resolves them by resynchronisation and counts them in the
/// link statistics instead.
#[derive(Debug, Error, Clone)]
pub enum RtuSimError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// No master connection is currently attached
    #[error("Not connected")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Frame-level errors
    #[error("Frame error: {0}")]
    Frame(String),
}

impl From<std::io::Error> for RtuSimError {
    fn from(err: std::io::Error) -> Self {
        RtuSimError::Io(err.to_string())
    }
}

// Helper methods for creating errors
impl RtuSimError {
    pub fn config(msg: impl Into<String>) -> Self {
        RtuSimError::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        RtuSimError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        RtuSimError::Io(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        RtuSimError::Frame(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RtuSimError::config("baud rate must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: baud rate must be positive"
        );

        let err = RtuSimError::NotConnected;
        assert_eq!(err.to_string(), "Not connected");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: RtuSimError = io_err.into();
        assert!(matches!(err, RtuSimError::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
