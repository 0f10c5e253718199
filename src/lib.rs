//! # rtusim - TCP-tunnelled Modbus RTU slave simulator
//!
//! Emulates a Modbus RTU slave device whose serial line is carried over a
//! plain TCP byte stream instead of a UART. A single master connects over
//! TCP and speaks raw RTU framing; the simulator reconstructs discrete
//! request frames out of the stream (silence-gap detection, per-function-
//! code length prediction, CRC-16 validation), hands them to the caller,
//! and paces response bytes so the link behaves like a real serial line at
//! the configured baud rate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rtusim::{append_crc, RtuSlaveConfig, RtuSlaveServer};
//!
//! #[tokio::main]
//! async fn main() -> rtusim::RtuSimResult<()> {
//!     let mut server = RtuSlaveServer::new(RtuSlaveConfig::default())?;
//!     let mut frames = server.frames().expect("frame sink");
//!     let sender = server.sender();
//!     server.start().await?;
//!
//!     while let Some(request) = frames.recv().await {
//!         // Interpret the request and build a response...
//!         let mut response = vec![request[0], request[1] | 0x80, 0x01];
//!         append_crc(&mut response);
//!         sender.send(&response).await?;
//!     }
//!     Ok(())
//! }
//! ```

/// Silence-driven frame assembly
pub mod assembler;

/// Protocol and timing constants
pub mod constants;

/// Error types
pub mod error;

/// CRC validation and frame length prediction
pub mod frame;

/// Serial parameters and timing computation
pub mod serial;

/// Listener and single-connection management
pub mod server;

/// Byte-stream reader and paced writer
pub mod transport;

// Re-export main types for convenience
pub use assembler::{AssemblerStats, Frame, FrameAssembler};
pub use error::{RtuSimError, RtuSimResult};
pub use frame::{append_crc, crc16, expected_request_length, verify_crc, FrameLength};
pub use serial::{SerialParams, SharedSerialParams};
pub use server::{RtuSlaveConfig, RtuSlaveServer};
pub use transport::{LinkStats, PacedSender};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
