use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::BeaconConfig;
use crate::core::message::{Kinematics, MessageType};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::engine::{BeaconEngine, Inbound};
use crate::transport::{Datagram, InboundQueue, Transport};
use crate::utils::metrics::Metrics;
use crate::utils::time::Clock;

/// Where the node's own position and motion come from.
pub trait KinematicsSource: Send + Sync {
    fn current(&self) -> Kinematics;
}

/// Latest kinematics pushed by the companion computer.
#[derive(Debug, Clone, Default)]
pub struct SharedKinematics {
    inner: Arc<RwLock<Kinematics>>,
}

impl SharedKinematics {
    pub fn new(initial: Kinematics) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn update(&self, kinematics: Kinematics) {
        match self.inner.write() {
            Ok(mut current) => *current = kinematics,
            Err(poisoned) => *poisoned.into_inner() = kinematics,
        }
    }
}

impl KinematicsSource for SharedKinematics {
    fn current(&self) -> Kinematics {
        match self.inner.read() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Drives one [`BeaconEngine`] from a single task.
///
/// The beacon timer, the inbound queue, out-of-band alert requests and the
/// shutdown channel are all multiplexed onto that task, so the engine is never
/// touched concurrently.
pub struct BeaconService<T, K, C> {
    engine: BeaconEngine,
    transport: T,
    kinematics: K,
    clock: C,
    inbound: InboundQueue,
    requests_tx: mpsc::Sender<MessageType>,
    requests_rx: mpsc::Receiver<MessageType>,
    beacon_period: Duration,
    metrics_interval: Duration,
}

impl<T, K, C> BeaconService<T, K, C>
where
    T: Transport,
    K: KinematicsSource,
    C: Clock,
{
    pub fn new(
        engine: BeaconEngine,
        transport: T,
        kinematics: K,
        clock: C,
        inbound: InboundQueue,
        config: &BeaconConfig,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(8);
        Self {
            engine,
            transport,
            kinematics,
            clock,
            inbound,
            requests_tx,
            requests_rx,
            beacon_period: config.protocol.beacon_period,
            metrics_interval: config.protocol.metrics_interval,
        }
    }

    /// Sender for emergency alerts and hazard warnings outside the beacon cadence.
    pub fn requests(&self) -> mpsc::Sender<MessageType> {
        self.requests_tx.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(self.engine.metrics())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.engine.dispatcher().clone()
    }

    pub fn engine(&self) -> &BeaconEngine {
        &self.engine
    }

    /// Run until `shutdown` fires or its sender is dropped. Hands the engine
    /// back so its final state can be inspected.
    #[instrument(skip_all, fields(node = %self.engine.node_id()))]
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) -> Result<BeaconEngine> {
        let mut beacon_tick = interval(self.beacon_period);
        beacon_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut metrics_tick = interval(self.metrics_interval);
        metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        metrics_tick.tick().await;

        info!(period = ?self.beacon_period, "Beacon service started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down beacon service");
                    self.engine.metrics().log_metrics();
                    return Ok(self.engine);
                }

                _ = beacon_tick.tick() => {
                    self.send_beacon().await;
                }

                Some(datagram) = self.inbound.recv() => {
                    self.receive(datagram);
                }

                Some(kind) = self.requests_rx.recv() => {
                    self.send(kind).await;
                }

                _ = metrics_tick.tick() => {
                    self.engine.metrics().log_metrics();
                }
            }
        }
    }

    async fn send_beacon(&mut self) {
        let now = self.clock.now();
        let state = self.kinematics.current();
        match self.engine.on_tick(now, state) {
            Ok(bytes) => self.transmit(&bytes).await,
            // Already recorded as a critical event when the last nonce went out.
            Err(ProtocolError::NonceExhausted) => debug!("Beacon suppressed - nonces exhausted"),
            Err(e) => error!(error = %e, "Failed to compose beacon"),
        }
    }

    async fn send(&mut self, kind: MessageType) {
        let now = self.clock.now();
        let state = self.kinematics.current();
        match self.engine.compose(kind, now, state) {
            Ok(bytes) => self.transmit(&bytes).await,
            Err(e) => warn!(error = %e, %kind, "Failed to compose message"),
        }
    }

    async fn transmit(&mut self, bytes: &[u8]) {
        if let Err(e) = self.transport.broadcast(bytes).await {
            self.engine.metrics().send_failed();
            debug!(error = %e, "Broadcast failed - not retried");
        }
    }

    fn receive(&mut self, datagram: Datagram) {
        let now = self.clock.now();
        match self.engine.handle_datagram(&datagram.bytes, now) {
            Ok(Inbound::Accepted(record)) => {
                trace!(sender = %record.sender_id, nonce = record.nonce, "Accepted");
            }
            Ok(Inbound::Ignored) => {}
            Err(e) if e.is_rejection() => {
                debug!(error = %e, from = %datagram.from, "Datagram rejected");
            }
            Err(e) => {
                warn!(error = %e, from = %datagram.from, "Datagram handling failed");
            }
        }
    }
}
