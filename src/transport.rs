//! Byte transport over the emulated serial link
//!
//! The TCP stream is treated as a UART wire: the read half is drained one
//! byte at a time straight into the frame assembler, and the write half is
//! paced so a response occupies the link for as long as it would at the
//! configured baud rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::assembler::FrameAssembler;
use crate::error::{RtuSimError, RtuSimResult};
use crate::serial::SharedSerialParams;

/// Link-level counters for the slave session
#[derive(Debug, Default)]
pub struct LinkStats {
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub connections_accepted: AtomicU64,
    pub connections_lost: AtomicU64,
}

/// Drain the read half of the live connection into the assembler
///
/// Runs until the connection is cancelled (normal teardown, exits silently)
/// or the peer closes / the read fails (abnormal, reported once through
/// `lost_tx` together with the connection generation so a stale loss can be
/// told apart from the current session's).
pub(crate) async fn read_loop(
    mut reader: OwnedReadHalf,
    assembler: FrameAssembler,
    cancel: CancellationToken,
    lost_tx: mpsc::UnboundedSender<u64>,
    generation: u64,
    stats: Arc<LinkStats>,
) {
    let mut byte = [0u8; 1];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("read loop cancelled");
                return;
            }
            read = reader.read(&mut byte) => match read {
                Ok(0) => {
                    debug!("master closed the connection");
                    let _ = lost_tx.send(generation);
                    return;
                }
                Ok(_) => {
                    stats.bytes_received.fetch_add(1, Ordering::Relaxed);
                    assembler.push_byte(byte[0]);
                }
                Err(e) => {
                    warn!("read error: {}", e);
                    let _ = lost_tx.send(generation);
                    return;
                }
            }
        }
    }
}

/// Paced write surface of the emulated link
///
/// Holds the write half of whichever connection is currently live. Sending
/// first waits out the transmission time of the whole buffer, then writes
/// and flushes, so master-side timeout logic sees realistic latencies.
pub struct PacedSender {
    writer: Mutex<Option<OwnedWriteHalf>>,
    params: SharedSerialParams,
    stats: Arc<LinkStats>,
}

impl PacedSender {
    pub(crate) fn new(params: SharedSerialParams, stats: Arc<LinkStats>) -> Self {
        Self {
            writer: Mutex::new(None),
            params,
            stats,
        }
    }

    /// Attach the write half of a newly accepted connection, dropping the
    /// previous one
    pub(crate) async fn attach(&self, writer: OwnedWriteHalf) {
        *self.writer.lock().await = Some(writer);
    }

    /// Drop the current write half, if any
    pub(crate) async fn detach(&self) {
        *self.writer.lock().await = None;
    }

    /// Whether a master connection is currently attached
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Send response bytes at the emulated line speed
    pub async fn send(&self, data: &[u8]) -> RtuSimResult<()> {
        let delay = self.params.get().transmission_delay(data.len());
        if !delay.is_zero() {
            sleep(delay).await;
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(RtuSimError::NotConnected)?;
        writer.write_all(data).await.map_err(|e| {
            error!("TX: {}", e);
            RtuSimError::io(format!("send error: {e}"))
        })?;
        writer
            .flush()
            .await
            .map_err(|e| RtuSimError::io(format!("flush error: {e}")))?;

        self.stats
            .bytes_sent
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        trace!("TX {}B: {}", data.len(), hex::encode(data));
        Ok(())
    }

    /// Send a single byte
    pub async fn send_byte(&self, byte: u8) -> RtuSimResult<()> {
        self.send(&[byte]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::SerialParams;

    #[tokio::test]
    async fn test_send_without_connection_returns_error() {
        let sender = PacedSender::new(
            SharedSerialParams::new(SerialParams::default()),
            Arc::new(LinkStats::default()),
        );
        assert!(!sender.is_connected().await);

        let result = sender.send(&[0x01, 0x03, 0x00, 0x00]).await;
        assert!(matches!(result, Err(RtuSimError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_writes_after_transmission_delay() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
            let mut buf = [0u8; 8];
            stream.read_exact(&mut buf).await.expect("read response");
            buf
        });

        let (stream, _) = listener.accept().await.expect("accept");
        let (_read_half, write_half) = stream.into_split();

        let stats = Arc::new(LinkStats::default());
        let sender = PacedSender::new(
            SharedSerialParams::new(SerialParams::default()),
            stats.clone(),
        );
        sender.attach(write_half).await;

        let payload = [0x11, 0x03, 0x04, 0x00, 0x2A, 0x00, 0x2B, 0x99];
        let started = std::time::Instant::now();
        sender.send(&payload).await.expect("send");

        // 8 bytes of 10 bits at 9600 baud take a little over 8 ms
        assert!(started.elapsed() >= std::time::Duration::from_millis(8));
        assert_eq!(client.await.expect("client task"), payload);
        assert_eq!(stats.bytes_sent.load(Ordering::Relaxed), 8);
    }
}
