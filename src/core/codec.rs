//! Fixed-layout beacon wire codec.
//!
//! ## Wire Format
//! ```text
//! [Type(1)] [SenderId(16)] [Timestamp(4)] [Nonce(4)]
//! [Latitude(4)] [Longitude(4)] [Speed(4)] [Heading(4)] [Tag(32)]
//! ```
//! Multi-byte integers and floats are little-endian. The tag is HMAC-SHA-256
//! over the first [`SIGNED_LEN`] bytes. Datagrams arrive whole, so there is no
//! streaming decoder: anything that is not exactly [`BEACON_SIZE`] bytes is
//! rejected before the type byte is even looked at.

use crate::core::message::{BeaconMessage, Kinematics, MessageType, SenderId, SENDER_ID_SIZE};
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::{compute_tag, verify_tag, AuthKey, TAG_SIZE};
use crate::utils::time::Millis;

/// Bytes covered by the authentication tag.
pub const SIGNED_LEN: usize = 1 + SENDER_ID_SIZE + 4 + 4 + 4 * 4;

/// Total datagram size. Every message type uses the same envelope.
pub const BEACON_SIZE: usize = SIGNED_LEN + TAG_SIZE;

const OFF_SENDER: usize = 1;
const OFF_TIMESTAMP: usize = OFF_SENDER + SENDER_ID_SIZE;
const OFF_NONCE: usize = OFF_TIMESTAMP + 4;
const OFF_LATITUDE: usize = OFF_NONCE + 4;
const OFF_LONGITUDE: usize = OFF_LATITUDE + 4;
const OFF_SPEED: usize = OFF_LONGITUDE + 4;
const OFF_HEADING: usize = OFF_SPEED + 4;

/// Expected datagram size for a message type.
#[inline]
pub const fn expected_size(_message_type: MessageType) -> usize {
    BEACON_SIZE
}

/// Serialize everything except the tag.
pub fn encode_signed(message: &BeaconMessage) -> [u8; SIGNED_LEN] {
    let mut out = [0u8; SIGNED_LEN];
    out[0] = message.message_type.as_u8();
    out[OFF_SENDER..OFF_TIMESTAMP].copy_from_slice(message.sender_id.as_bytes());
    out[OFF_TIMESTAMP..OFF_NONCE].copy_from_slice(&message.timestamp.as_u32().to_le_bytes());
    out[OFF_NONCE..OFF_LATITUDE].copy_from_slice(&message.nonce.to_le_bytes());
    let k = &message.kinematics;
    out[OFF_LATITUDE..OFF_LONGITUDE].copy_from_slice(&k.latitude.to_le_bytes());
    out[OFF_LONGITUDE..OFF_SPEED].copy_from_slice(&k.longitude.to_le_bytes());
    out[OFF_SPEED..OFF_HEADING].copy_from_slice(&k.speed.to_le_bytes());
    out[OFF_HEADING..SIGNED_LEN].copy_from_slice(&k.heading.to_le_bytes());
    out
}

/// Serialize and sign. The tag already present on `message` is ignored.
pub fn encode(message: &BeaconMessage, key: &AuthKey) -> [u8; BEACON_SIZE] {
    let signed = encode_signed(message);
    let tag = compute_tag(key, &signed);

    let mut out = [0u8; BEACON_SIZE];
    out[..SIGNED_LEN].copy_from_slice(&signed);
    out[SIGNED_LEN..].copy_from_slice(&tag);
    out
}

/// Parse a datagram without checking the tag.
///
/// Returns the message together with the byte range the tag was computed over.
///
/// # Errors
/// - `MalformedMessage` when the length is not [`BEACON_SIZE`]
/// - `UnknownType` when the discriminator is not a known [`MessageType`]
/// - `InvalidSenderId` when the id field is empty, non-ASCII or badly padded
pub fn decode(bytes: &[u8]) -> Result<(BeaconMessage, &[u8])> {
    if bytes.len() != BEACON_SIZE {
        return Err(ProtocolError::MalformedMessage {
            expected: BEACON_SIZE,
            actual: bytes.len(),
        });
    }

    let message_type = MessageType::try_from(bytes[0])?;

    let mut raw_id = [0u8; SENDER_ID_SIZE];
    raw_id.copy_from_slice(&bytes[OFF_SENDER..OFF_TIMESTAMP]);
    let sender_id = SenderId::from_wire(raw_id)?;

    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(&bytes[SIGNED_LEN..]);

    let message = BeaconMessage {
        message_type,
        sender_id,
        timestamp: Millis::new(read_u32(bytes, OFF_TIMESTAMP)),
        nonce: read_u32(bytes, OFF_NONCE),
        kinematics: Kinematics {
            latitude: read_f32(bytes, OFF_LATITUDE),
            longitude: read_f32(bytes, OFF_LONGITUDE),
            speed: read_f32(bytes, OFF_SPEED),
            heading: read_f32(bytes, OFF_HEADING),
        },
        auth_tag,
    };

    Ok((message, &bytes[..SIGNED_LEN]))
}

/// Check a decoded message's tag against `key` in constant time.
pub fn verify(message: &BeaconMessage, key: &AuthKey) -> bool {
    verify_tag(key, &encode_signed(message), &message.auth_tag)
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(bytes, offset))
}
