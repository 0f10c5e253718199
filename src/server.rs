//! Single-master RTU slave server
//!
//! Owns the listening socket and at most one live master connection.
//! Accepting a new connection supersedes the previous one; losing the
//! connection tears its resources down, clears the receive buffer and
//! immediately re-arms the accept loop so the next master can connect
//! without a restart.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::{Frame, FrameAssembler};
use crate::constants::DEFAULT_PORT;
use crate::error::{RtuSimError, RtuSimResult};
use crate::serial::{SerialParams, SharedSerialParams};
use crate::transport::{read_loop, LinkStats, PacedSender};

/// Slave server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtuSlaveConfig {
    /// Address the TCP listener binds to
    pub bind_address: SocketAddr,
    /// Serial parameters of the emulated line
    pub serial: SerialParams,
}

impl Default for RtuSlaveConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            serial: SerialParams::default(),
        }
    }
}

/// TCP-tunnelled Modbus RTU slave
pub struct RtuSlaveServer {
    config: RtuSlaveConfig,
    params: SharedSerialParams,
    assembler: FrameAssembler,
    frame_rx: Option<mpsc::UnboundedReceiver<Frame>>,
    sender: Arc<PacedSender>,
    stats: Arc<LinkStats>,
    shutdown: CancellationToken,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
    watcher_task: Option<JoinHandle<()>>,
}

impl RtuSlaveServer {
    /// Create a server from a validated configuration
    pub fn new(config: RtuSlaveConfig) -> RtuSimResult<Self> {
        config.serial.validate()?;
        let params = SharedSerialParams::new(config.serial);
        let (assembler, frame_rx) = FrameAssembler::new(config.serial.silence_interval());
        let stats = Arc::new(LinkStats::default());
        let sender = Arc::new(PacedSender::new(params.clone(), stats.clone()));

        Ok(Self {
            config,
            params,
            assembler,
            frame_rx: Some(frame_rx),
            sender,
            stats,
            shutdown: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            accept_task: None,
            watcher_task: None,
        })
    }

    /// Take the frame sink receiver
    ///
    /// Yields each completed, CRC-valid request frame in arrival order.
    /// Single consumer; returns `None` once taken.
    pub fn frames(&mut self) -> Option<mpsc::UnboundedReceiver<Frame>> {
        self.frame_rx.take()
    }

    /// Paced write surface for response bytes
    pub fn sender(&self) -> Arc<PacedSender> {
        self.sender.clone()
    }

    /// Link-level counters
    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    /// Extraction counters and buffer state
    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Snapshot of the current serial parameters
    pub fn serial_params(&self) -> SerialParams {
        self.params.get()
    }

    /// Replace the serial parameters
    ///
    /// Recomputes the silence interval for subsequent frame boundaries;
    /// bytes already pending are untouched. Fails fast on invalid values.
    pub fn set_serial_params(&self, params: SerialParams) -> RtuSimResult<()> {
        self.params.set(params)?;
        self.assembler
            .set_silence_interval(params.silence_interval());
        debug!(
            "serial parameters updated: {:?}, silence interval {:?}",
            params,
            params.silence_interval()
        );
        Ok(())
    }

    /// Bind the listener and spawn the accept loop and silence watcher
    pub async fn start(&mut self) -> RtuSimResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RtuSimError::config("server already started"));
        }

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                RtuSimError::connection(format!("bind {}: {e}", self.config.bind_address))
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RtuSimError::connection(format!("local address: {e}")))?;
        self.local_addr = Some(local_addr);
        info!("RTU slave listening on {}", local_addr);

        self.watcher_task = Some(self.assembler.spawn_watcher(self.shutdown.clone()));
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            self.assembler.clone(),
            self.sender.clone(),
            self.stats.clone(),
            self.shutdown.clone(),
        )));
        Ok(())
    }

    /// Stop the server and all its tasks
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        self.sender.detach().await;
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.watcher_task.take() {
            let _ = task.await;
        }
        self.running.store(false, Ordering::SeqCst);
        info!("RTU slave stopped");
    }

    /// Whether the server has been started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Accept loop: one live master at a time
///
/// Loss events carry the generation of the connection they belong to, so a
/// late report from an already-superseded session cannot tear down the
/// current one.
async fn accept_loop(
    listener: TcpListener,
    assembler: FrameAssembler,
    sender: Arc<PacedSender>,
    stats: Arc<LinkStats>,
    shutdown: CancellationToken,
) {
    let (lost_tx, mut lost_rx) = mpsc::unbounded_channel::<u64>();
    let mut conn_token: Option<CancellationToken> = None;
    let mut generation: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            Some(lost_generation) = lost_rx.recv() => {
                if lost_generation != generation {
                    debug!("ignoring loss report from superseded connection");
                    continue;
                }
                if let Some(token) = conn_token.take() {
                    token.cancel();
                }
                sender.detach().await;
                // Stale bytes from the dead session must never merge with
                // the next session's stream.
                assembler.reset();
                stats.connections_lost.fetch_add(1, Ordering::Relaxed);
                info!("master link lost, waiting for a new connection");
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Some(token) = conn_token.take() {
                        debug!("superseding previous master connection");
                        token.cancel();
                    }
                    info!("master connected: {}", peer);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("TCP_NODELAY: {}", e);
                    }

                    generation += 1;
                    assembler.reset();
                    let (read_half, write_half) = stream.into_split();
                    sender.attach(write_half).await;

                    let token = shutdown.child_token();
                    tokio::spawn(read_loop(
                        read_half,
                        assembler.clone(),
                        token.clone(),
                        lost_tx.clone(),
                        generation,
                        stats.clone(),
                    ));
                    conn_token = Some(token);
                    stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                }
            }
        }
    }

    if let Some(token) = conn_token.take() {
        token.cancel();
    }
    debug!("accept loop stopped");
}
