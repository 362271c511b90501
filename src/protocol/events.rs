//! Bounded log of security-relevant rejections.
//!
//! Rejections are silent on the air. This log keeps the most recent ones with
//! a severity so an operator-facing reporter can surface them.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{info, warn};

use crate::core::message::SenderId;
use crate::utils::time::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    AuthenticationFailure,
    ReplayDetected,
    StaleTimestamp,
    /// A sender crossed its rate limit
    Flood,
    TableFull,
    NonceExhausted,
    Rekeyed,
}

impl SecurityEventKind {
    pub fn severity(self) -> Severity {
        match self {
            SecurityEventKind::StaleTimestamp | SecurityEventKind::Rekeyed => Severity::Low,
            SecurityEventKind::TableFull => Severity::Medium,
            SecurityEventKind::AuthenticationFailure
            | SecurityEventKind::ReplayDetected
            | SecurityEventKind::Flood => Severity::High,
            SecurityEventKind::NonceExhausted => Severity::Critical,
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityEventKind::AuthenticationFailure => "authentication_failure",
            SecurityEventKind::ReplayDetected => "replay_detected",
            SecurityEventKind::StaleTimestamp => "stale_timestamp",
            SecurityEventKind::Flood => "flood",
            SecurityEventKind::TableFull => "table_full",
            SecurityEventKind::NonceExhausted => "nonce_exhausted",
            SecurityEventKind::Rekeyed => "rekeyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityEvent {
    pub at: Millis,
    pub kind: SecurityEventKind,
    pub severity: Severity,
    /// Claimed sender, when the datagram decoded far enough to have one
    pub sender: Option<SenderId>,
}

#[derive(Debug)]
pub struct SecurityEventLog {
    events: VecDeque<SecurityEvent>,
    capacity: usize,
    total: u64,
}

impl SecurityEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn record(&mut self, at: Millis, kind: SecurityEventKind, sender: Option<SenderId>) {
        let severity = kind.severity();
        match severity {
            Severity::Low => info!(%kind, ?sender, "Security event"),
            _ => warn!(%kind, ?severity, ?sender, "Security event"),
        }

        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(SecurityEvent {
            at,
            kind,
            severity,
            sender,
        });
    }

    /// The last `count` events at or above `min_severity`, oldest first.
    pub fn recent(&self, count: usize, min_severity: Severity) -> Vec<SecurityEvent> {
        let matching: Vec<_> = self
            .events
            .iter()
            .filter(|e| e.severity >= min_severity)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(count);
        matching.into_iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded since creation, including ones that rolled off.
    pub fn total(&self) -> u64 {
        self.total
    }
}
