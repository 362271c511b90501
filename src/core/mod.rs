//! # Core Wire Components
//!
//! The beacon message model and its fixed-layout codec.
//!
//! ## Components
//! - **Message**: `BeaconMessage`, `MessageType`, `SenderId`, `Kinematics`
//! - **Codec**: encode/sign, decode, constant-time verify
//!
//! ## Wire Format
//! ```text
//! [Type(1)] [SenderId(16)] [Timestamp(4)] [Nonce(4)] [Lat/Lon/Speed/Heading(16)] [Tag(32)]
//! ```
//!
//! ## Security
//! - Exact-length check before any field is read
//! - Tag covers every byte before it
//! - Payload is authenticated, not encrypted

pub mod codec;
pub mod message;
