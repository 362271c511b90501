//! # Error Types
//!
//! Error handling for the beacon protocol core.
//!
//! This module defines every rejection and failure the core can produce, from
//! malformed datagrams arriving off the air to local configuration mistakes.
//!
//! ## Error Categories
//! - **Wire Errors**: wrong datagram length, unknown message type, bad sender id
//! - **Security Errors**: authentication failure, replay, stale timestamp, flooding
//! - **Capacity Errors**: a bounded per-sender table refused a new identity
//! - **Key Lifecycle**: exhaustion of the outgoing nonce range, invalid key material
//! - **Runtime Errors**: transport, configuration and channel failures
//!
//! Inbound rejections never escalate: the engine counts them and drops the
//! datagram. Only `NonceExhausted` stops this node from sending until it is
//! re-keyed.
//!
//! ## Example Usage
//! ```rust
//! use v2x_beacon::core::codec;
//! use v2x_beacon::error::ProtocolError;
//!
//! match codec::decode(&[0x01, 0x02]) {
//!     Err(ProtocolError::MalformedMessage { expected, actual }) => {
//!         assert_eq!(expected, codec::BEACON_SIZE);
//!         assert_eq!(actual, 2);
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Sender id validation
    pub const ERR_SENDER_ID_EMPTY: &str = "Sender id cannot be empty";
    pub const ERR_SENDER_ID_TOO_LONG: &str = "Sender id exceeds 16 bytes";
    pub const ERR_SENDER_ID_NOT_ASCII: &str = "Sender id must be printable ASCII";
    pub const ERR_SENDER_ID_PADDING: &str = "Sender id padding must be zero bytes";

    /// Key material
    pub const ERR_KEY_TOO_SHORT: &str = "Key must be at least 16 bytes";
    pub const ERR_KEY_TOO_LONG: &str = "Key must be at most 64 bytes";
    pub const ERR_KEY_NOT_HEX: &str = "Key is not valid hex";
    pub const ERR_KEY_RNG: &str = "OS random number generator unavailable";

    /// Capacity-bounded tables
    pub const TABLE_RATE: &str = "rate limiter";
    pub const TABLE_REPLAY: &str = "replay guard";

    /// Runtime
    pub const ERR_INBOUND_CLOSED: &str = "Inbound queue closed";
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

// ProtocolError is the primary error type for all beacon operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Malformed message: expected {expected} bytes, got {actual}")]
    MalformedMessage { expected: usize, actual: usize },

    #[error("Unknown message type: 0x{0:02x}")]
    UnknownType(u8),

    #[error("Invalid sender id: {0}")]
    InvalidSenderId(String),

    #[error("Authentication tag mismatch")]
    AuthenticationFailure,

    #[error("Replay detected")]
    ReplayDetected,

    #[error("Stale timestamp")]
    StaleTimestamp,

    #[error("Rate limited")]
    RateLimited,

    #[error("Table full: {0}")]
    TableFull(String),

    #[error("Outgoing nonce range exhausted - re-key required")]
    NonceExhausted,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error is an inbound rejection (counted and dropped) rather
    /// than a local failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedMessage { .. }
                | ProtocolError::UnknownType(_)
                | ProtocolError::InvalidSenderId(_)
                | ProtocolError::AuthenticationFailure
                | ProtocolError::ReplayDetected
                | ProtocolError::StaleTimestamp
                | ProtocolError::RateLimited
                | ProtocolError::TableFull(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
