//! Silence-driven frame assembly
//!
//! TCP provides no message boundaries, so request frames are recovered the
//! way a real RTU link delimits them: a byte that arrives re-arms a silence
//! deadline, and when the line has been quiet for the configured interval
//! the pending bytes are scanned with a sliding window. Garbage is shed one
//! byte at a time; an incomplete frame is kept as a tail for the next pass.
//!
//! The receive buffer is the only state shared between the reader task and
//! the silence watcher. The lock is held for short bounded sections only:
//! append one byte, swap the buffer out, re-insert the tail. Extraction and
//! publication run outside the lock so a slow frame consumer can never
//! stall byte reception.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::constants::{MIN_FRAME_LEN, RECEIVE_BUFFER_CAP};
use crate::frame::{expected_request_length, verify_crc, FrameLength};

/// A completed request frame, CRC-valid at the moment of emission
pub type Frame = Bytes;

/// Extraction counters, shared with the owning session
#[derive(Debug, Default)]
pub struct AssemblerStats {
    /// Frames published to the sink
    pub frames_extracted: AtomicU64,
    /// Candidate windows rejected by the CRC check
    pub crc_failures: AtomicU64,
    /// Bytes shed by resynchronisation or overflow flushes
    pub bytes_discarded: AtomicU64,
    /// Times the receive buffer was discarded wholesale
    pub overflow_flushes: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Shared {
    buffer: Mutex<Vec<u8>>,
    silence: Mutex<Duration>,
    deadline_tx: watch::Sender<Option<Instant>>,
    frame_tx: mpsc::UnboundedSender<Frame>,
    stats: AssemblerStats,
}

/// Assembles RTU request frames out of an undifferentiated byte stream
///
/// Cloning is cheap and shares the same buffer, timer and sink.
#[derive(Clone)]
pub struct FrameAssembler {
    shared: Arc<Shared>,
}

impl FrameAssembler {
    /// Create an assembler and the receiving end of its frame sink
    pub fn new(silence: Duration) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (deadline_tx, _) = watch::channel(None);
        let assembler = Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Vec::new()),
                silence: Mutex::new(silence),
                deadline_tx,
                frame_tx,
                stats: AssemblerStats::default(),
            }),
        };
        (assembler, frame_rx)
    }

    /// Spawn the silence watcher task
    ///
    /// The watcher owns the single-shot deadline: every received byte
    /// republishes it, and extraction runs exactly when it expires. The
    /// task exits when `cancel` fires.
    pub fn spawn_watcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let mut deadline_rx = self.shared.deadline_tx.subscribe();
        tokio::spawn(async move {
            let mut armed: Option<Instant> = *deadline_rx.borrow_and_update();
            loop {
                match armed {
                    Some(when) => {
                        // A deadline republished by a late byte must win
                        // over the expiry of the deadline it replaces.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            changed = deadline_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                armed = *deadline_rx.borrow_and_update();
                            }
                            _ = tokio::time::sleep_until(when) => {
                                armed = None;
                                shared.on_silence_elapsed();
                            }
                        }
                    },
                    None => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            changed = deadline_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                armed = *deadline_rx.borrow_and_update();
                            }
                        }
                    },
                }
            }
            debug!("silence watcher stopped");
        })
    }

    /// Append one received byte and re-arm the silence deadline
    pub fn push_byte(&self, byte: u8) {
        {
            let mut buffer = lock(&self.shared.buffer);
            buffer.push(byte);
        }
        let silence = *lock(&self.shared.silence);
        self.shared
            .deadline_tx
            .send_replace(Some(Instant::now() + silence));
    }

    /// Replace the silence interval used for subsequent re-arms
    ///
    /// Pending bytes are left untouched.
    pub fn set_silence_interval(&self, interval: Duration) {
        *lock(&self.shared.silence) = interval;
    }

    /// Current silence interval
    pub fn silence_interval(&self) -> Duration {
        *lock(&self.shared.silence)
    }

    /// Drop all pending bytes and disarm the deadline
    ///
    /// Used on connection teardown so stale bytes from a dead session never
    /// merge with the next session's stream.
    pub fn reset(&self) {
        lock(&self.shared.buffer).clear();
        self.shared.deadline_tx.send_replace(None);
    }

    /// Number of pending unframed bytes
    pub fn pending_len(&self) -> usize {
        lock(&self.shared.buffer).len()
    }

    /// Extraction counters
    pub fn stats(&self) -> &AssemblerStats {
        &self.shared.stats
    }
}

impl Shared {
    /// The silence deadline expired: scan the pending bytes for frames
    fn on_silence_elapsed(&self) {
        let snapshot = {
            let mut buffer = lock(&self.buffer);
            if buffer.is_empty() {
                return;
            }
            if buffer.len() > RECEIVE_BUFFER_CAP {
                warn!(
                    "receive buffer overflow ({} bytes pending), discarding",
                    buffer.len()
                );
                self.stats
                    .bytes_discarded
                    .fetch_add(buffer.len() as u64, Ordering::Relaxed);
                self.stats.overflow_flushes.fetch_add(1, Ordering::Relaxed);
                buffer.clear();
                return;
            }
            // Bytes arriving from here on accumulate in the live buffer
            // while extraction runs on the detached snapshot.
            std::mem::take(&mut *buffer)
        };

        let outcome = extract_frames(&snapshot);

        self.stats
            .crc_failures
            .fetch_add(outcome.crc_failures, Ordering::Relaxed);
        self.stats
            .bytes_discarded
            .fetch_add(outcome.bytes_discarded, Ordering::Relaxed);

        if !outcome.tail.is_empty() {
            // The tail predates anything that arrived during extraction,
            // so it goes back in front of the live buffer.
            let mut buffer = lock(&self.buffer);
            let mut merged = outcome.tail;
            merged.extend_from_slice(&buffer);
            *buffer = merged;
        }

        for frame in outcome.frames {
            trace!("frame ready: {}", hex::encode(&frame));
            self.stats.frames_extracted.fetch_add(1, Ordering::Relaxed);
            if self.frame_tx.send(frame).is_err() {
                warn!("frame sink closed, frame dropped");
            }
        }
    }
}

/// Result of one extraction pass over a detached snapshot
#[derive(Debug, Default)]
struct Extraction {
    frames: Vec<Frame>,
    tail: Vec<u8>,
    bytes_discarded: u64,
    crc_failures: u64,
}

/// Sliding-window frame extraction
///
/// Repeatedly tries to parse a frame at the current offset. An unknown
/// function code or a failed CRC sheds exactly one byte - a coarser skip
/// could swallow a valid frame that starts inside the garbage. Data that
/// may still become a frame once more bytes arrive is returned as the tail.
fn extract_frames(snapshot: &[u8]) -> Extraction {
    let mut out = Extraction::default();
    let mut start = 0;

    while start < snapshot.len() {
        let window = &snapshot[start..];
        if window.len() < MIN_FRAME_LEN {
            break;
        }

        match expected_request_length(window) {
            FrameLength::Invalid => {
                start += 1;
                out.bytes_discarded += 1;
            },
            FrameLength::NeedMore => break,
            FrameLength::Exact(len) if window.len() < len => break,
            FrameLength::Exact(len) => {
                if verify_crc(&window[..len]) {
                    out.frames.push(Bytes::copy_from_slice(&window[..len]));
                    start += len;
                } else {
                    // A genuine frame may begin one byte further in.
                    out.crc_failures += 1;
                    out.bytes_discarded += 1;
                    start += 1;
                }
            },
        }
    }

    out.tail = snapshot[start..].to_vec();
    out
}
