//! In-process broadcast medium.
//!
//! Every attached endpoint hears every broadcast except, unless self-echo is
//! enabled, its own. Each delivery is independently dropped with the
//! configured loss probability.

use rand::Rng;
use std::future::{ready, Future};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::config::DEFAULT_PORT;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::{InboundHandle, Transport};

#[derive(Debug)]
struct Endpoint {
    addr: SocketAddr,
    inbound: InboundHandle,
}

#[derive(Debug, Default)]
struct MediumState {
    endpoints: Vec<Endpoint>,
    loss: f64,
    self_echo: bool,
}

/// Shared broadcast medium. Clones refer to the same medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    state: Arc<Mutex<MediumState>>,
    delivered: Arc<AtomicU64>,
    lost: Arc<AtomicU64>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Medium that drops each delivery with probability `loss` (clamped to 0..=1).
    pub fn with_loss(loss: f64) -> Self {
        let medium = Self::new();
        medium.set_loss(loss);
        medium
    }

    pub fn set_loss(&self, loss: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.loss = if loss.is_finite() { loss.clamp(0.0, 1.0) } else { 0.0 };
        }
    }

    /// Deliver broadcasts back to their sender as well, like some radios do.
    pub fn set_self_echo(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.self_echo = enabled;
        }
    }

    /// Join the medium. Datagrams heard by the new endpoint go to `inbound`.
    pub fn attach(&self, inbound: InboundHandle) -> Result<MemoryTransport> {
        let mut state = self.lock()?;
        let index = u8::try_from(state.endpoints.len() + 1).map_err(|_| {
            ProtocolError::TransportError("Memory medium supports at most 255 endpoints".into())
        })?;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, index)), DEFAULT_PORT);
        state.endpoints.push(Endpoint { addr, inbound });

        Ok(MemoryTransport {
            medium: self.clone(),
            addr,
        })
    }

    /// Deliveries that reached a queue.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Deliveries dropped by simulated loss.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MediumState>> {
        self.state
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
    }

    fn transmit(&self, from: SocketAddr, bytes: &[u8]) -> Result<()> {
        let state = self.lock()?;
        let mut rng = rand::rng();
        let payload = bytes::Bytes::copy_from_slice(bytes);

        for endpoint in &state.endpoints {
            if endpoint.addr == from && !state.self_echo {
                continue;
            }
            if state.loss > 0.0 && rng.random_bool(state.loss) {
                trace!(%from, to = %endpoint.addr, "Simulated loss");
                self.lost.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            // A closed or full receiver is that endpoint's problem, not the sender's.
            if let Ok(true) = endpoint.inbound.deliver(payload.clone(), from) {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

/// One endpoint's view of a [`MemoryMedium`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    medium: MemoryMedium,
    addr: SocketAddr,
}

impl MemoryTransport {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transport for MemoryTransport {
    fn broadcast(&self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send {
        ready(self.medium.transmit(self.addr, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::Metrics;

    fn endpoint(medium: &MemoryMedium) -> (MemoryTransport, crate::transport::InboundQueue) {
        let (handle, queue) = InboundHandle::channel(16, Arc::new(Metrics::new()));
        (medium.attach(handle).unwrap(), queue)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_others_only() {
        let medium = MemoryMedium::new();
        let (a, mut a_rx) = endpoint(&medium);
        let (_b, mut b_rx) = endpoint(&medium);
        let (_c, mut c_rx) = endpoint(&medium);

        a.broadcast(b"hello").await.unwrap();
        assert_eq!(b_rx.recv().await.unwrap().from, a.addr());
        assert_eq!(c_rx.recv().await.unwrap().bytes.as_ref(), b"hello");
        assert!(a_rx.try_recv().is_err());
        assert_eq!(medium.delivered(), 2);
    }

    #[tokio::test]
    async fn test_self_echo() {
        let medium = MemoryMedium::new();
        medium.set_self_echo(true);
        let (a, mut a_rx) = endpoint(&medium);
        a.broadcast(b"me").await.unwrap();
        assert_eq!(a_rx.recv().await.unwrap().from, a.addr());
    }

    #[tokio::test]
    async fn test_total_loss() {
        let medium = MemoryMedium::with_loss(1.0);
        let (a, _a_rx) = endpoint(&medium);
        let (_b, mut b_rx) = endpoint(&medium);
        for _ in 0..10 {
            a.broadcast(b"gone").await.unwrap();
        }
        assert!(b_rx.try_recv().is_err());
        assert_eq!(medium.lost(), 10);
    }
}
