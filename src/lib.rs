//! # v2x-beacon
//!
//! Authenticated broadcast beacon core for vehicle-to-vehicle telemetry.
//!
//! Nodes broadcast a fixed 73-byte beacon carrying their position and motion
//! every beacon period. Every datagram carries an HMAC-SHA-256 tag under a
//! shared key; receivers reject forged, replayed, stale and flooding traffic
//! before a peer's state reaches the neighbor table.
//!
//! ## Layout
//! - [`core`]: message model and fixed-layout codec
//! - [`protocol`]: beacon engine, neighbor table, security events, forwarding
//! - [`transport`]: UDP broadcast and in-memory media
//! - [`service`]: async driver for one engine
//! - [`utils`]: crypto, replay guard, rate limiter, time, metrics, logging
//! - [`config`], [`error`]
//!
//! ## Example
//! ```rust
//! use v2x_beacon::config::BeaconConfig;
//! use v2x_beacon::core::message::Kinematics;
//! use v2x_beacon::protocol::{BeaconEngine, Inbound};
//! use v2x_beacon::utils::crypto::AuthKey;
//! use v2x_beacon::utils::time::Millis;
//!
//! let key = AuthKey::from_bytes(&[7u8; 32]).unwrap();
//! let a_config = BeaconConfig::default_with_overrides(|c| c.node.id = "V001".into());
//! let b_config = BeaconConfig::default_with_overrides(|c| c.node.id = "V002".into());
//! let mut a = BeaconEngine::new(&a_config, key.clone()).unwrap();
//! let mut b = BeaconEngine::new(&b_config, key).unwrap();
//!
//! let now = Millis::new(1_000);
//! let datagram = a.on_tick(now, Kinematics::new(30.0444, 31.2357, 25.5, 90.0)).unwrap();
//! assert!(matches!(b.handle_datagram(&datagram, now), Ok(Inbound::Accepted(_))));
//! assert_eq!(b.neighbors().len(), 1);
//! ```
//!
//! Payloads are authenticated, not encrypted.

#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
