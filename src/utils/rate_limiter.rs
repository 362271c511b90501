//! Per-sender message rate limiting.
//!
//! Each tracked sender gets a fixed window (1 s by default) and a counter.
//! Every call counts, including the ones that end up rejected, so a flooding
//! sender stays throttled for the rest of its window.
//!
//! The tracked-sender table is capacity-bounded. When it is full, an entry
//! whose window has already elapsed is recycled for the newcomer (an expired
//! window carries no state worth keeping). Only when every tracked sender is
//! active in its current window is the newcomer refused.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::core::message::SenderId;
use crate::utils::time::Millis;

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    Admitted,
    /// Over budget for the current window. `first` is set on the call that
    /// crossed the limit.
    Limited { first: bool },
    /// Unknown sender and every slot is in active use.
    Full,
}

impl RateVerdict {
    #[inline]
    pub fn is_admitted(self) -> bool {
        matches!(self, RateVerdict::Admitted)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: Millis,
}

impl RateWindow {
    fn expired(&self, now: Millis, window_ms: u32) -> bool {
        now.elapsed_since(self.window_start) >= window_ms
    }
}

/// Settings for [`RateLimiter`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterSettings {
    /// Messages admitted per sender per window
    pub max_per_window: u32,
    /// Window length in milliseconds
    pub window_ms: u32,
    /// Maximum senders tracked
    pub max_senders: usize,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            max_per_window: 50,
            window_ms: 1_000,
            max_senders: 10,
        }
    }
}

/// Fixed-window message counter per sender.
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<SenderId, RateWindow>,
    settings: RateLimiterSettings,
}

impl RateLimiter {
    pub fn new(settings: RateLimiterSettings) -> Self {
        Self {
            windows: HashMap::with_capacity(settings.max_senders),
            settings,
        }
    }

    /// `true` if the message may proceed.
    pub fn admit(&mut self, sender: &SenderId, now: Millis) -> bool {
        self.check(sender, now).is_admitted()
    }

    /// Count one message from `sender` and decide whether it is admitted.
    pub fn check(&mut self, sender: &SenderId, now: Millis) -> RateVerdict {
        let RateLimiterSettings {
            max_per_window,
            window_ms,
            max_senders,
        } = self.settings;

        if let Some(window) = self.windows.get_mut(sender) {
            if window.expired(now, window_ms) {
                window.count = 1;
                window.window_start = now;
            } else {
                window.count = window.count.saturating_add(1);
            }

            return if window.count <= max_per_window {
                RateVerdict::Admitted
            } else {
                let first = window.count == max_per_window + 1;
                if first {
                    warn!(%sender, limit = max_per_window, "Sender exceeded rate limit");
                }
                RateVerdict::Limited { first }
            };
        }

        if self.windows.len() >= max_senders && !self.recycle_expired(now) {
            warn!(%sender, tracked = self.windows.len(), "Rate limiter full - sender refused");
            return RateVerdict::Full;
        }

        self.windows.insert(
            *sender,
            RateWindow {
                count: 1,
                window_start: now,
            },
        );
        if max_per_window == 0 {
            return RateVerdict::Limited { first: true };
        }
        RateVerdict::Admitted
    }

    /// Remove one entry whose window has elapsed. Returns whether a slot was freed.
    fn recycle_expired(&mut self, now: Millis) -> bool {
        let window_ms = self.settings.window_ms;
        let victim = self
            .windows
            .iter()
            .filter(|(_, w)| w.expired(now, window_ms))
            .max_by_key(|(_, w)| now.elapsed_since(w.window_start))
            .map(|(id, _)| *id);

        match victim {
            Some(id) => {
                self.windows.remove(&id);
                debug!(sender = %id, "Recycled expired rate window");
                true
            }
            None => false,
        }
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn prune(&mut self, now: Millis) -> usize {
        let window_ms = self.settings.window_ms;
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.expired(now, window_ms));
        before - self.windows.len()
    }

    /// Messages counted for `sender` in its current window.
    pub fn count(&self, sender: &SenderId) -> Option<u32> {
        self.windows.get(sender).map(|w| w.count)
    }

    pub fn tracked_senders(&self) -> usize {
        self.windows.len()
    }
}
