//! # Beacon Service
//!
//! Async driver around the synchronous engine: beacon timer, inbound queue,
//! alert requests and graceful shutdown on one task.

pub mod beacon;

pub use beacon::{BeaconService, KinematicsSource, SharedKinematics};
