//! # Beacon Protocol
//!
//! The beacon engine and the per-sender state it owns.
//!
//! ## Components
//! - **Engine**: send and receive pipelines
//! - **Security**: node identity, key and outgoing nonce counter
//! - **Neighbors**: bounded table of recently heard peers
//! - **Events**: bounded log of security-relevant rejections
//! - **Dispatcher**: routes validated records to forwarding components
//!
//! ## Receive Order
//! decode → authenticate → self check → rate limit → replay guard → neighbor update

pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod neighbors;
pub mod security;


pub use dispatcher::{Dispatcher, ForwardRecord, RecordKind};
pub use engine::{BeaconEngine, Inbound};
pub use neighbors::{NeighborRecord, NeighborTable, UpsertOutcome};
