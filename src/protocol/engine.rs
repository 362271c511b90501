//! # Beacon Engine
//!
//! Synchronous protocol core. Owns every piece of per-sender state and runs
//! both paths:
//!
//! - **Send**: maintenance, then stamp time and nonce, sign, hand bytes back
//! - **Receive**: decode → authenticate → self check → rate → replay → neighbor update
//!
//! The receive order is fixed. Authentication gates everything so a forger
//! cannot spend a real sender's rate budget, and the rate limiter runs before
//! the replay guard so an authenticated replay flood is throttled too.
//!
//! The engine never blocks and never touches the network. The async service
//! drives it from a single task.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::BeaconConfig;
use crate::core::codec::{self, BEACON_SIZE};
use crate::core::message::{BeaconMessage, Kinematics, MessageType, SenderId};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, ForwardRecord, RecordKind};
use crate::protocol::events::{SecurityEventKind, SecurityEventLog};
use crate::protocol::neighbors::{NeighborTable, UpsertOutcome};
use crate::protocol::security::SecurityContext;
use crate::utils::crypto::{self, AuthKey};
use crate::utils::metrics::Metrics;
use crate::utils::rate_limiter::{RateLimiter, RateVerdict};
use crate::utils::replay_guard::{ReplayGuard, ReplayVerdict};
use crate::utils::time::{duration_to_ms, Millis};

/// Outcome of a datagram that was not rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Passed every check; the record has been dispatched.
    Accepted(ForwardRecord),
    /// Our own transmission heard back from the medium.
    Ignored,
}

#[derive(Debug)]
pub struct BeaconEngine {
    security: SecurityContext,
    replay: ReplayGuard,
    rate: RateLimiter,
    neighbors: NeighborTable,
    events: SecurityEventLog,
    metrics: Arc<Metrics>,
    dispatcher: Dispatcher,
}

impl BeaconEngine {
    /// Build an engine from validated configuration and the provisioned key.
    ///
    /// # Errors
    /// `ConfigError` if the configuration does not validate, `InvalidSenderId`
    /// if the node id cannot go on the wire.
    pub fn new(config: &BeaconConfig, key: AuthKey) -> Result<Self> {
        Self::with_next_nonce(config, key, 0)
    }

    /// Like [`new`](Self::new), but continues a key's nonce sequence from a
    /// persisted [`pending_nonce`](Self::pending_nonce). Restarting at 0 with a
    /// used key would repeat nonces, and strict-order peers would drop every
    /// beacon until their window for this node retires.
    pub fn with_next_nonce(config: &BeaconConfig, key: AuthKey, next_nonce: u32) -> Result<Self> {
        config.validate_strict()?;
        let node_id = config.node.sender_id()?;

        Ok(Self {
            security: SecurityContext::resume(node_id, key, next_nonce),
            replay: ReplayGuard::with_settings(config.replay_settings()),
            rate: RateLimiter::new(config.rate_settings()),
            neighbors: NeighborTable::new(
                config.limits.max_neighbors,
                duration_to_ms(config.protocol.neighbor_staleness),
            ),
            events: SecurityEventLog::new(config.limits.event_log_capacity),
            metrics: Arc::new(Metrics::new()),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Periodic tick: housekeeping, then this node's beacon.
    pub fn on_tick(&mut self, now: Millis, state: Kinematics) -> Result<[u8; BEACON_SIZE]> {
        self.maintain(now);
        self.compose(MessageType::Beacon, now, state)
    }

    /// Evict stale neighbors, retire idle replay windows and prune expired rate windows.
    pub fn maintain(&mut self, now: Millis) {
        let evicted = self.neighbors.evict_stale(now);
        if evicted > 0 {
            self.metrics.neighbors_evicted(evicted);
        }
        let retired = self.replay.retire_idle(now);
        let pruned = self.rate.prune(now);
        if evicted + retired + pruned > 0 {
            debug!(evicted, retired, pruned, "Per-sender state maintained");
        }
    }

    /// Stamp, number and sign an outgoing message of any type.
    ///
    /// # Errors
    /// `NonceExhausted` once the key's nonce range is used up.
    #[instrument(level = "trace", skip(self, state), fields(node = %self.security.node_id()))]
    pub fn compose(
        &mut self,
        kind: MessageType,
        now: Millis,
        state: Kinematics,
    ) -> Result<[u8; BEACON_SIZE]> {
        let nonce = self.security.next_nonce()?;
        if self.security.is_exhausted() {
            let node = *self.security.node_id();
            self.events
                .record(now, SecurityEventKind::NonceExhausted, Some(node));
        }

        let node_id = *self.security.node_id();
        let message = BeaconMessage::unsigned(kind, node_id, now, nonce, state);
        let bytes = codec::encode(&message, self.security.key());
        self.metrics.beacon_sent();

        let record = ForwardRecord::new(
            RecordKind::outbound(kind),
            node_id,
            now,
            nonce,
            state,
            kind == MessageType::EmergencyAlert,
        );
        self.forward(&record);

        Ok(bytes)
    }

    /// Validate and absorb one received datagram.
    ///
    /// Every rejection is counted before it is returned; callers only need
    /// the error for logging or tests.
    #[instrument(level = "trace", skip(self, bytes), fields(len = bytes.len()))]
    pub fn handle_datagram(&mut self, bytes: &[u8], now: Millis) -> Result<Inbound> {
        self.metrics.datagram_received();

        let (message, signed) = match codec::decode(bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                match e {
                    ProtocolError::UnknownType(kind) => {
                        debug!(kind, "Dropped datagram with unknown type");
                        self.metrics.unknown_type();
                    }
                    _ => {
                        debug!(error = %e, "Dropped malformed datagram");
                        self.metrics.malformed();
                    }
                }
                return Err(e);
            }
        };
        let sender = message.sender_id;

        if !crypto::verify_tag(self.security.key(), signed, &message.auth_tag) {
            self.metrics.auth_failure();
            self.events
                .record(now, SecurityEventKind::AuthenticationFailure, Some(sender));
            return Err(ProtocolError::AuthenticationFailure);
        }

        if sender == *self.security.node_id() {
            self.metrics.self_message();
            return Ok(Inbound::Ignored);
        }

        match self.rate.check(&sender, now) {
            RateVerdict::Admitted => {}
            RateVerdict::Limited { first } => {
                self.metrics.rejected();
                if first {
                    self.events.record(now, SecurityEventKind::Flood, Some(sender));
                }
                return Err(ProtocolError::RateLimited);
            }
            RateVerdict::Full => {
                self.metrics.rejected();
                self.metrics.table_full();
                self.events
                    .record(now, SecurityEventKind::TableFull, Some(sender));
                return Err(ProtocolError::TableFull(constants::TABLE_RATE.to_string()));
            }
        }

        match self
            .replay
            .check_and_record(&sender, message.nonce, message.timestamp, now)
        {
            ReplayVerdict::Accept => {}
            ReplayVerdict::Replay => {
                self.metrics.replay_attempt();
                self.events
                    .record(now, SecurityEventKind::ReplayDetected, Some(sender));
                return Err(ProtocolError::ReplayDetected);
            }
            ReplayVerdict::Stale => {
                self.metrics.stale();
                self.events
                    .record(now, SecurityEventKind::StaleTimestamp, Some(sender));
                return Err(ProtocolError::StaleTimestamp);
            }
            ReplayVerdict::Full => {
                self.metrics.table_full();
                self.events
                    .record(now, SecurityEventKind::TableFull, Some(sender));
                return Err(ProtocolError::TableFull(constants::TABLE_REPLAY.to_string()));
            }
        }

        let is_emergency = self.absorb(&message, now);
        self.metrics.accepted();

        let record = ForwardRecord::new(
            RecordKind::inbound(message.message_type),
            sender,
            message.timestamp,
            message.nonce,
            message.kinematics,
            is_emergency,
        );
        self.forward(&record);

        Ok(Inbound::Accepted(record))
    }

    /// Apply an accepted message to the neighbor table. Returns the sender's
    /// emergency flag as it should be forwarded.
    fn absorb(&mut self, message: &BeaconMessage, now: Millis) -> bool {
        let sender = &message.sender_id;
        match message.message_type {
            MessageType::Beacon | MessageType::EmergencyAlert => {
                if self.neighbors.upsert(sender, message.kinematics, now) == UpsertOutcome::Full {
                    // Still forwarded; only tracking is refused.
                    self.metrics.table_full();
                    debug!(%sender, "Accepted message from untracked sender");
                }
                if message.message_type == MessageType::EmergencyAlert {
                    self.neighbors.mark_emergency(sender);
                    return true;
                }
            }
            MessageType::HazardWarning => {
                // Hazard kinematics describe the hazard, not the sender.
                self.neighbors.touch(sender, now);
            }
        }
        self.neighbors
            .get(sender)
            .is_some_and(|record| record.is_emergency)
    }

    fn forward(&self, record: &ForwardRecord) {
        match self.dispatcher.dispatch(record) {
            Ok(0) => {}
            Ok(failures) => {
                for _ in 0..failures {
                    self.metrics.forward_error();
                }
            }
            Err(e) => {
                warn!(error = %e, "Dispatcher unavailable");
                self.metrics.forward_error();
            }
        }
    }

    /// Install a new key. Restarts this node's nonce sequence and forgets
    /// every peer's replay window, since their sequences restart as well.
    pub fn rekey(&mut self, key: AuthKey, now: Millis) {
        self.security.rekey(key);
        self.replay.clear();
        let node = *self.security.node_id();
        self.events.record(now, SecurityEventKind::Rekeyed, Some(node));
    }

    pub fn node_id(&self) -> &SenderId {
        self.security.node_id()
    }

    /// Next outgoing nonce, `None` once the key is exhausted. Persist it
    /// before the process stops.
    pub fn pending_nonce(&self) -> Option<u32> {
        self.security.pending_nonce()
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn events(&self) -> &SecurityEventLog {
        &self.events
    }

    /// Handle registry for forwarding components. Clones share handlers.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
