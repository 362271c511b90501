//! Millisecond timestamps and clock sources.
//!
//! Nodes stamp beacons with a 32-bit millisecond counter that wraps roughly
//! every 49.7 days. All arithmetic on [`Millis`] is wrapping so that a counter
//! rollover never looks like a huge clock skew.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wrapping 32-bit millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millis(u32);

impl Millis {
    /// Zero timestamp.
    pub const ZERO: Millis = Millis(0);

    #[inline]
    pub const fn new(ms: u32) -> Self {
        Millis(ms)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, assuming `earlier` is not in the future.
    #[inline]
    pub const fn elapsed_since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Absolute distance between two timestamps, taking the shorter way round
    /// the wrapping counter.
    #[inline]
    pub fn distance(self, other: Millis) -> u32 {
        let forward = self.0.wrapping_sub(other.0);
        let backward = other.0.wrapping_sub(self.0);
        forward.min(backward)
    }

    /// Timestamp `ms` milliseconds later, wrapping.
    #[inline]
    pub const fn wrapping_add(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_add(ms))
    }
}

impl From<u32> for Millis {
    fn from(ms: u32) -> Self {
        Millis(ms)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Clamp a duration to the 32-bit millisecond range used on the wire.
pub fn duration_to_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Monotonic millisecond source.
pub trait Clock: Send + Sync {
    /// Current timestamp.
    fn now(&self) -> Millis;
}

/// Process-relative monotonic clock.
///
/// Reads tokio's clock, so it stands still while a test runtime is paused.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Millis {
        // Truncation is the wrap.
        Millis(self.start.elapsed().as_millis() as u32)
    }
}

/// Wall clock in milliseconds since the Unix epoch, truncated to 32 bits.
///
/// Freshness checks compare a sender's stamp with the receiver's clock, so
/// deployed nodes need a shared time base (GNSS or NTP disciplined).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Millis(since_epoch.as_millis() as u32)
    }
}

/// Manually driven clock for tests and simulation.
///
/// Clones share the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            current: Arc::new(AtomicU32::new(start)),
        }
    }

    pub fn set(&self, ms: u32) {
        self.current.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u32) {
        // fetch_add wraps on overflow, matching Millis semantics
        self.current.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        Millis(self.current.load(Ordering::SeqCst))
    }
}
