use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::codec::BytesCodec;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, instrument, warn};

use crate::config::TransportConfig;
use crate::error::{ProtocolError, Result};
use crate::transport::{InboundHandle, Transport};

/// UDP socket with `SO_BROADCAST` set, sending every datagram to one
/// broadcast address.
#[derive(Debug, Clone)]
pub struct UdpBroadcastTransport {
    socket: Arc<UdpSocket>,
    destination: SocketAddr,
}

impl UdpBroadcastTransport {
    #[instrument]
    pub async fn bind(bind: SocketAddr, destination: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        socket.set_broadcast(true)?;
        info!(local = %socket.local_addr()?, %destination, "Broadcast socket bound");

        Ok(Self {
            socket: Arc::new(socket),
            destination,
        })
    }

    pub async fn from_config(config: &TransportConfig) -> Result<Self> {
        let bind = parse_addr("bind_address", &config.bind_address)?;
        let destination = parse_addr("broadcast_address", &config.broadcast_address)?;
        Self::bind(bind, destination).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Spawn the receive loop, feeding every datagram into `inbound`.
    ///
    /// The loop ends when the engine side of the queue is dropped.
    pub fn spawn_receiver(&self, inbound: InboundHandle) -> JoinHandle<()> {
        let mut framed = UdpFramed::new(Arc::clone(&self.socket), BytesCodec::new());

        tokio::spawn(async move {
            while let Some(result) = framed.next().await {
                match result {
                    Ok((bytes, from)) => {
                        if let Err(e) = inbound.deliver(bytes.freeze(), from) {
                            debug!(error = %e, "Receive loop stopping");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "UDP receive failed");
                    }
                }
            }
        })
    }
}

impl Transport for UdpBroadcastTransport {
    async fn broadcast(&self, bytes: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(bytes, self.destination).await?;
        if sent != bytes.len() {
            return Err(ProtocolError::TransportError(format!(
                "Short send: {sent} of {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }
}

fn parse_addr(name: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid {name} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::metrics::Metrics;

    #[tokio::test]
    async fn test_loopback_delivery() {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let receiver = UdpBroadcastTransport::bind(any, any).await.unwrap();
        let sender = UdpBroadcastTransport::bind(any, receiver.local_addr().unwrap())
            .await
            .unwrap();

        let (handle, mut queue) = InboundHandle::channel(8, Arc::new(Metrics::new()));
        let task = receiver.spawn_receiver(handle);

        sender.broadcast(&[7u8; 73]).await.unwrap();
        let datagram = queue.recv().await.unwrap();
        assert_eq!(datagram.bytes.len(), 73);
        assert_eq!(datagram.from, sender.local_addr().unwrap());

        drop(queue);
        task.abort();
    }

    #[tokio::test]
    async fn test_bad_config_address() {
        let config = TransportConfig {
            bind_address: "not-an-address".into(),
            ..TransportConfig::default()
        };
        assert!(matches!(
            UdpBroadcastTransport::from_config(&config).await,
            Err(ProtocolError::ConfigError(_))
        ));
    }
}
