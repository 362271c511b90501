//! Observability and Metrics
//!
//! Counters for the beacon engine. Inbound rejections are silent on the air,
//! so these counters are the only place they become visible to an operator.
//!
//! Uses atomic counters so the service task can update them while a reporting
//! task reads snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one beacon engine
#[derive(Debug)]
pub struct Metrics {
    /// Own messages composed and handed to the transport
    pub beacons_sent: AtomicU64,
    /// Transport reported a send failure (never retried)
    pub send_failures: AtomicU64,
    /// Datagrams handed to the engine, whatever their fate
    pub datagrams_received: AtomicU64,
    /// Wrong length or invalid sender id field
    pub malformed_messages: AtomicU64,
    /// Unrecognized message type byte
    pub unknown_types: AtomicU64,
    /// Tag mismatches
    pub auth_failures: AtomicU64,
    /// Our own beacons echoed back by the medium
    pub self_messages: AtomicU64,
    /// Dropped by the rate limiter (including capacity refusals)
    pub rejected_messages: AtomicU64,
    /// Nonce already seen or out of order
    pub replay_attempts: AtomicU64,
    /// Timestamp outside the freshness window
    pub stale_messages: AtomicU64,
    /// A bounded per-sender table refused a new identity
    pub table_full: AtomicU64,
    /// Messages that passed every check
    pub received_messages: AtomicU64,
    /// Neighbor records evicted for staleness
    pub neighbors_evicted: AtomicU64,
    /// Inbound datagrams dropped because the queue was full
    pub queue_overflows: AtomicU64,
    /// Forwarding handlers that returned an error
    pub forward_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            beacons_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            unknown_types: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            self_messages: AtomicU64::new(0),
            rejected_messages: AtomicU64::new(0),
            replay_attempts: AtomicU64::new(0),
            stale_messages: AtomicU64::new(0),
            table_full: AtomicU64::new(0),
            received_messages: AtomicU64::new(0),
            neighbors_evicted: AtomicU64::new(0),
            queue_overflows: AtomicU64::new(0),
            forward_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn beacon_sent(&self) {
        Self::bump(&self.beacons_sent);
    }

    pub fn send_failed(&self) {
        Self::bump(&self.send_failures);
    }

    pub fn datagram_received(&self) {
        Self::bump(&self.datagrams_received);
    }

    pub fn malformed(&self) {
        Self::bump(&self.malformed_messages);
    }

    pub fn unknown_type(&self) {
        Self::bump(&self.unknown_types);
    }

    pub fn auth_failure(&self) {
        Self::bump(&self.auth_failures);
    }

    pub fn self_message(&self) {
        Self::bump(&self.self_messages);
    }

    pub fn rejected(&self) {
        Self::bump(&self.rejected_messages);
    }

    pub fn replay_attempt(&self) {
        Self::bump(&self.replay_attempts);
    }

    pub fn stale(&self) {
        Self::bump(&self.stale_messages);
    }

    pub fn table_full(&self) {
        Self::bump(&self.table_full);
    }

    pub fn accepted(&self) {
        Self::bump(&self.received_messages);
    }

    pub fn neighbors_evicted(&self, count: usize) {
        self.neighbors_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn queue_overflow(&self) {
        Self::bump(&self.queue_overflows);
    }

    pub fn forward_error(&self) {
        Self::bump(&self.forward_errors);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            beacons_sent: self.beacons_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            unknown_types: self.unknown_types.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            self_messages: self.self_messages.load(Ordering::Relaxed),
            rejected_messages: self.rejected_messages.load(Ordering::Relaxed),
            replay_attempts: self.replay_attempts.load(Ordering::Relaxed),
            stale_messages: self.stale_messages.load(Ordering::Relaxed),
            table_full: self.table_full.load(Ordering::Relaxed),
            received_messages: self.received_messages.load(Ordering::Relaxed),
            neighbors_evicted: self.neighbors_evicted.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            forward_errors: self.forward_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            beacons_sent = snapshot.beacons_sent,
            send_failures = snapshot.send_failures,
            datagrams_received = snapshot.datagrams_received,
            malformed_messages = snapshot.malformed_messages,
            unknown_types = snapshot.unknown_types,
            auth_failures = snapshot.auth_failures,
            self_messages = snapshot.self_messages,
            rejected_messages = snapshot.rejected_messages,
            replay_attempts = snapshot.replay_attempts,
            stale_messages = snapshot.stale_messages,
            table_full = snapshot.table_full,
            received_messages = snapshot.received_messages,
            neighbors_evicted = snapshot.neighbors_evicted,
            queue_overflows = snapshot.queue_overflows,
            forward_errors = snapshot.forward_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Beacon metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub beacons_sent: u64,
    pub send_failures: u64,
    pub datagrams_received: u64,
    pub malformed_messages: u64,
    pub unknown_types: u64,
    pub auth_failures: u64,
    pub self_messages: u64,
    pub rejected_messages: u64,
    pub replay_attempts: u64,
    pub stale_messages: u64,
    pub table_full: u64,
    pub received_messages: u64,
    pub neighbors_evicted: u64,
    pub queue_overflows: u64,
    pub forward_errors: u64,
    pub uptime_seconds: u64,
}
