//! # Utility Modules
//!
//! Supporting utilities for authentication, per-sender admission control,
//! timing, logging and metrics.
//!
//! ## Components
//! - **Crypto**: HMAC-SHA-256 tags with constant-time verification
//! - **Replay Guard**: per-sender nonce windows and timestamp freshness
//! - **Rate Limiter**: per-sender fixed-window message caps
//! - **Time**: wrapping millisecond timestamps and clock sources
//! - **Logging**: structured logging configuration
//! - **Metrics**: thread-safe observability counters
//!
//! ## Security
//! - Keys zeroized on drop (zeroize crate)
//! - Every per-sender table has a hard capacity

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod rate_limiter;
pub mod replay_guard;
pub mod time;

// Re-export public types for advanced users
pub use rate_limiter::{RateLimiter, RateVerdict};
pub use replay_guard::{ReplayGuard, ReplayVerdict};
