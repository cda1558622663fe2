//! # Link Transport Module
//!
//! An in-memory, full-duplex chunk link standing in for the wireless
//! transport between the sensor and the controller. Each direction is a
//! bounded delivery queue; payloads are capped at the link's chunk size
//! and there is no multi-chunk reassembly, so an over-long line is
//! truncated at the boundary rather than split.

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use log::warn;
use std::time::Duration;
use thiserror::Error;

/// Largest chunk the link delivers in one piece, in bytes.
pub const MAX_CHUNK_BYTES: usize = 19;

/// Depth of each direction's delivery queue, in chunks.
pub const DELIVERY_QUEUE_DEPTH: usize = 64;

/// How long a sender waits for queue space before reporting failure.
pub const ENQUEUE_WAIT: Duration = Duration::from_millis(10);

/// Errors surfaced by link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No chunk arrived within the allowed wait.
    #[error("no chunk within the allowed wait")]
    Timeout,
    /// The peer's delivery queue stayed full for the whole enqueue wait.
    #[error("peer delivery queue stayed full")]
    QueueFull,
    /// The peer end of the link has been dropped.
    #[error("link peer disconnected")]
    Disconnected,
}

/// One end of the link. Cloneable so a node can split sending and
/// receiving across its threads; clones share the same two queues.
#[derive(Clone)]
pub struct LinkEnd {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Creates a connected pair of link ends.
pub fn link_pair() -> (LinkEnd, LinkEnd) {
    let (a_tx, a_rx) = bounded(DELIVERY_QUEUE_DEPTH);
    let (b_tx, b_rx) = bounded(DELIVERY_QUEUE_DEPTH);
    (
        LinkEnd { tx: a_tx, rx: b_rx },
        LinkEnd { tx: b_tx, rx: a_rx },
    )
}

impl LinkEnd {
    /// Sends one chunk to the peer, waiting a bounded time for queue
    /// space. Payloads over `MAX_CHUNK_BYTES` are truncated with a
    /// warning; the remainder is lost, matching the link's no-reassembly
    /// contract.
    pub fn send(&self, payload: &[u8]) -> Result<(), LinkError> {
        let chunk = if payload.len() > MAX_CHUNK_BYTES {
            warn!(
                "chunk of {} bytes truncated to {MAX_CHUNK_BYTES}",
                payload.len()
            );
            payload[..MAX_CHUNK_BYTES].to_vec()
        } else {
            payload.to_vec()
        };
        match self.tx.send_timeout(chunk, ENQUEUE_WAIT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(LinkError::QueueFull),
            Err(SendTimeoutError::Disconnected(_)) => Err(LinkError::Disconnected),
        }
    }

    /// Receives the next inbound chunk, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Ok(chunk),
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Disconnected),
        }
    }
}
