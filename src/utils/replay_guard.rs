//! Replay Guard for Beacon Nonces
//!
//! This module tracks, per remote sender, a small FIFO window of recently
//! accepted nonces together with the highest nonce seen, and checks the
//! sender's timestamp against the local clock.
//!
//! The window is a detection window, not a full history: once a nonce scrolls
//! out it is no longer remembered. With `strict_order` enabled (the default)
//! that gap is closed by also rejecting any nonce not above the highest one
//! accepted. Windows are retired once their sender has been quiet for twice the
//! freshness window, at which point any replay of their nonces already fails
//! the freshness check.

use std::collections::{HashMap, VecDeque};
use tracing::{debug, instrument, warn};

use crate::core::message::SenderId;
use crate::utils::time::Millis;

/// Outcome of [`ReplayGuard::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayVerdict {
    /// New nonce inside the freshness window; it has been recorded.
    Accept,
    /// Nonce already seen (or out of order under strict ordering).
    Replay,
    /// Timestamp too far from the local clock.
    Stale,
    /// Unknown sender and no window slot available.
    Full,
}

/// Per-sender record of accepted nonces.
#[derive(Debug, Clone)]
struct NonceWindow {
    /// Insertion order for FIFO eviction
    recent: VecDeque<u32>,
    /// Highest nonce accepted so far
    highest: u32,
    /// Sender timestamp of the last accepted message
    last_timestamp: Millis,
    /// Local time of the last acceptance
    last_accepted_at: Millis,
}

impl NonceWindow {
    fn new(capacity: usize, nonce: u32, timestamp: Millis, now: Millis) -> Self {
        let mut recent = VecDeque::with_capacity(capacity);
        recent.push_back(nonce);
        Self {
            recent,
            highest: nonce,
            last_timestamp: timestamp,
            last_accepted_at: now,
        }
    }

    fn contains(&self, nonce: u32) -> bool {
        self.recent.contains(&nonce)
    }

    fn record(&mut self, capacity: usize, nonce: u32, timestamp: Millis, now: Millis) {
        if self.recent.len() >= capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(nonce);
        self.highest = self.highest.max(nonce);
        self.last_timestamp = timestamp;
        self.last_accepted_at = now;
    }
}

/// Settings for [`ReplayGuard`].
#[derive(Debug, Clone, Copy)]
pub struct ReplayGuardSettings {
    /// Nonces remembered per sender
    pub window_size: usize,
    /// Maximum distance between sender timestamp and local clock (ms)
    pub freshness_ms: u32,
    /// Reject nonces not above the highest accepted
    pub strict_order: bool,
    /// Maximum number of senders with a live window
    pub max_senders: usize,
}

impl Default for ReplayGuardSettings {
    fn default() -> Self {
        Self {
            window_size: 20,
            freshness_ms: 5_000,
            strict_order: true,
            max_senders: 32,
        }
    }
}

/// Per-sender nonce windows with freshness checking.
#[derive(Debug)]
pub struct ReplayGuard {
    windows: HashMap<SenderId, NonceWindow>,
    settings: ReplayGuardSettings,
}

impl ReplayGuard {
    /// Create a replay guard with default settings
    ///
    /// Default window: 20 nonces, freshness 5 s, strict ordering, 32 senders
    pub fn new() -> Self {
        Self::with_settings(ReplayGuardSettings::default())
    }

    /// Create a replay guard with custom settings
    pub fn with_settings(settings: ReplayGuardSettings) -> Self {
        Self {
            windows: HashMap::with_capacity(settings.max_senders),
            settings,
        }
    }

    /// Check a nonce/timestamp pair from `sender` and record it if accepted.
    ///
    /// Not idempotent: the same nonce accepted once is a `Replay` the second time.
    #[instrument(level = "trace", skip(self), fields(sender = %sender))]
    pub fn check_and_record(
        &mut self,
        sender: &SenderId,
        nonce: u32,
        timestamp: Millis,
        now: Millis,
    ) -> ReplayVerdict {
        let window_size = self.settings.window_size.max(1);

        if let Some(window) = self.windows.get(sender) {
            if window.contains(nonce) {
                warn!(%sender, nonce, "Replay detected - nonce already in window");
                return ReplayVerdict::Replay;
            }
            if self.settings.strict_order && nonce <= window.highest {
                warn!(
                    %sender,
                    nonce,
                    highest = window.highest,
                    "Replay detected - nonce not above highest accepted"
                );
                return ReplayVerdict::Replay;
            }
        }

        if now.distance(timestamp) > self.settings.freshness_ms {
            debug!(%sender, %timestamp, %now, "Stale timestamp");
            return ReplayVerdict::Stale;
        }

        match self.windows.get_mut(sender) {
            Some(window) => {
                window.record(window_size, nonce, timestamp, now);
            }
            None => {
                if self.windows.len() >= self.settings.max_senders {
                    self.retire_idle(now);
                }
                if self.windows.len() >= self.settings.max_senders {
                    warn!(%sender, tracked = self.windows.len(), "Replay guard full - sender not tracked");
                    return ReplayVerdict::Full;
                }
                self.windows
                    .insert(*sender, NonceWindow::new(window_size, nonce, timestamp, now));
            }
        }

        debug!(%sender, nonce, "Nonce recorded");
        ReplayVerdict::Accept
    }

    /// Drop windows whose sender has been quiet for more than twice the
    /// freshness window. Returns how many were retired.
    pub fn retire_idle(&mut self, now: Millis) -> usize {
        let idle_limit = self.settings.freshness_ms.saturating_mul(2);
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.elapsed_since(window.last_accepted_at) <= idle_limit);

        let removed = before - self.windows.len();
        if removed > 0 {
            debug!("Retired {} idle replay windows", removed);
        }
        removed
    }

    /// Highest nonce accepted from `sender`, if a window exists.
    pub fn highest_nonce(&self, sender: &SenderId) -> Option<u32> {
        self.windows.get(sender).map(|w| w.highest)
    }

    /// Sender timestamp of the last accepted message from `sender`.
    pub fn last_timestamp(&self, sender: &SenderId) -> Option<Millis> {
        self.windows.get(sender).map(|w| w.last_timestamp)
    }

    /// Number of senders with a live window.
    pub fn tracked_senders(&self) -> usize {
        self.windows.len()
    }

    /// Get current guard statistics
    pub fn stats(&self) -> ReplayGuardStats {
        ReplayGuardStats {
            senders: self.windows.len(),
            max_senders: self.settings.max_senders,
            window_size: self.settings.window_size,
            freshness_ms: self.settings.freshness_ms,
        }
    }

    /// Clear all windows (used when the network is re-keyed)
    pub fn clear(&mut self) {
        self.windows.clear();
        debug!("Replay guard cleared");
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the replay guard
#[derive(Debug, Clone)]
pub struct ReplayGuardStats {
    /// Senders currently tracked
    pub senders: usize,
    /// Maximum senders tracked
    pub max_senders: usize,
    /// Nonces remembered per sender
    pub window_size: usize,
    /// Freshness window in milliseconds
    pub freshness_ms: u32,
}
