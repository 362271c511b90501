//! # Transport Layer
//!
//! Unreliable datagram broadcast underneath the beacon engine.
//!
//! ## Components
//! - **Transport**: `broadcast(bytes)`, never retried
//! - **InboundHandle**: non-blocking hand-off from a receive callback to the engine task
//! - **UDP**: `SO_BROADCAST` socket for real deployments
//! - **Memory**: in-process shared medium with configurable loss, for tests and simulation
//!
//! Received datagrams are never processed on the receiving context. They are
//! queued and drained by the single task that owns the engine, so per-sender
//! state needs no locks.

use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::Metrics;

pub mod memory;
pub mod udp;

pub use memory::{MemoryMedium, MemoryTransport};
pub use udp::UdpBroadcastTransport;

/// One received datagram and where it came from.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub bytes: Bytes,
    pub from: SocketAddr,
}

/// Best-effort broadcast of one datagram.
pub trait Transport: Send + Sync {
    fn broadcast(&self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Receiving end of the inbound queue, drained by the engine task.
pub type InboundQueue = mpsc::Receiver<Datagram>;

/// Cloneable sender side of the inbound queue.
///
/// Safe to call from any receive callback: it never blocks and never waits
/// for the engine.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    tx: mpsc::Sender<Datagram>,
    metrics: Arc<Metrics>,
}

impl InboundHandle {
    /// Bounded queue of `capacity` datagrams. Overflows are counted in `metrics`.
    pub fn channel(capacity: usize, metrics: Arc<Metrics>) -> (Self, InboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    /// Queue a datagram for the engine.
    ///
    /// Returns `Ok(false)` when the queue is full and the datagram was dropped.
    ///
    /// # Errors
    /// `ChannelClosed` once the engine task has gone away.
    pub fn deliver(&self, bytes: impl Into<Bytes>, from: SocketAddr) -> Result<bool> {
        let datagram = Datagram {
            bytes: bytes.into(),
            from,
        };
        match self.tx.try_send(datagram) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                trace!(%from, "Inbound queue full - datagram dropped");
                self.metrics.queue_overflow();
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(ProtocolError::ChannelClosed(
                constants::ERR_INBOUND_CLOSED.to_string(),
            )),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
