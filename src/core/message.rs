//! Beacon message model.
//!
//! A [`BeaconMessage`] is one node's self-reported kinematic snapshot. The
//! three message kinds carried on the mesh share the same envelope; only the
//! meaning of the kinematic fields differs (a hazard warning reports the hazard
//! location rather than the sender's own position).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::TAG_SIZE;
use crate::utils::time::Millis;

/// Width of the sender id field on the wire.
pub const SENDER_ID_SIZE: usize = 16;

/// Message discriminator carried in the first byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Periodic kinematic status.
    Beacon = 0x01,
    /// Emergency vehicle alert.
    EmergencyAlert = 0x02,
    /// Hazard warning at a reported location.
    HazardWarning = 0x03,
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [
        MessageType::Beacon,
        MessageType::EmergencyAlert,
        MessageType::HazardWarning,
    ];

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(MessageType::Beacon),
            0x02 => Ok(MessageType::EmergencyAlert),
            0x03 => Ok(MessageType::HazardWarning),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Beacon => "beacon",
            MessageType::EmergencyAlert => "emergency",
            MessageType::HazardWarning => "hazard",
        };
        f.write_str(name)
    }
}

/// Fixed-width, null-padded ASCII node identifier.
///
/// The raw 16-byte field is kept as-is so that re-encoding a decoded message
/// reproduces the signed bytes exactly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId([u8; SENDER_ID_SIZE]);

impl SenderId {
    /// Build an id from a string of 1 to 16 printable ASCII characters.
    pub fn new(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(ProtocolError::InvalidSenderId(
                constants::ERR_SENDER_ID_EMPTY.into(),
            ));
        }
        if id.len() > SENDER_ID_SIZE {
            return Err(ProtocolError::InvalidSenderId(
                constants::ERR_SENDER_ID_TOO_LONG.into(),
            ));
        }
        if !id.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(ProtocolError::InvalidSenderId(
                constants::ERR_SENDER_ID_NOT_ASCII.into(),
            ));
        }

        let mut raw = [0u8; SENDER_ID_SIZE];
        raw[..id.len()].copy_from_slice(id.as_bytes());
        Ok(SenderId(raw))
    }

    /// Validate a raw wire field.
    pub fn from_wire(raw: [u8; SENDER_ID_SIZE]) -> Result<Self> {
        let len = raw.iter().position(|&b| b == 0).unwrap_or(SENDER_ID_SIZE);
        if len == 0 {
            return Err(ProtocolError::InvalidSenderId(
                constants::ERR_SENDER_ID_EMPTY.into(),
            ));
        }
        if !raw[..len].iter().all(|&b| b.is_ascii_graphic() || b == b' ') {
            return Err(ProtocolError::InvalidSenderId(
                constants::ERR_SENDER_ID_NOT_ASCII.into(),
            ));
        }
        if raw[len..].iter().any(|&b| b != 0) {
            return Err(ProtocolError::InvalidSenderId(
                constants::ERR_SENDER_ID_PADDING.into(),
            ));
        }
        Ok(SenderId(raw))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SENDER_ID_SIZE] {
        &self.0
    }

    /// The id without its null padding.
    pub fn as_str(&self) -> &str {
        let len = self
            .0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SENDER_ID_SIZE);
        // Constructors only admit ASCII.
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }
}

impl fmt::Debug for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderId({:?})", self.as_str())
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SenderId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        SenderId::new(s)
    }
}

impl Serialize for SenderId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SenderId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SenderId::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Position and motion payload.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kinematics {
    pub latitude: f32,
    pub longitude: f32,
    /// Metres per second.
    pub speed: f32,
    /// Degrees clockwise from north.
    pub heading: f32,
}

impl Kinematics {
    pub const fn new(latitude: f32, longitude: f32, speed: f32, heading: f32) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            heading,
        }
    }
}

/// Parses `"lat lon speed heading"`; commas work as separators too.
impl std::str::FromStr for Kinematics {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<f32> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ProtocolError::Custom(format!("Bad kinematics '{line}': {e}")))?;

        match fields[..] {
            [latitude, longitude, speed, heading] => {
                Ok(Self::new(latitude, longitude, speed, heading))
            }
            _ => Err(ProtocolError::Custom(format!(
                "Bad kinematics '{line}': expected 4 fields, got {}",
                fields.len()
            ))),
        }
    }
}

/// One beacon datagram, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconMessage {
    pub message_type: MessageType,
    pub sender_id: SenderId,
    /// Sender's clock at composition time.
    pub timestamp: Millis,
    /// Strictly increasing per sender for the lifetime of the key.
    pub nonce: u32,
    pub kinematics: Kinematics,
    /// HMAC over every preceding field. All zeroes until signed.
    pub auth_tag: [u8; TAG_SIZE],
}

impl BeaconMessage {
    /// An unsigned message; [`crate::core::codec::encode`] fills the tag.
    pub fn unsigned(
        message_type: MessageType,
        sender_id: SenderId,
        timestamp: Millis,
        nonce: u32,
        kinematics: Kinematics,
    ) -> Self {
        Self {
            message_type,
            sender_id,
            timestamp,
            nonce,
            kinematics,
            auth_tag: [0u8; TAG_SIZE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinematics_from_line() {
        let k: Kinematics = "30.0444, 31.2357 25.5 90".parse().unwrap();
        assert_eq!(k, Kinematics::new(30.0444, 31.2357, 25.5, 90.0));
        assert!("1 2 3".parse::<Kinematics>().is_err());
        assert!("1 2 3 north".parse::<Kinematics>().is_err());
    }

    #[test]
    fn test_sender_id_padding() {
        let id = SenderId::new("V001").unwrap();
        assert_eq!(&id.as_bytes()[..4], b"V001");
        assert!(id.as_bytes()[4..].iter().all(|&b| b == 0));
        assert_eq!(id.as_str(), "V001");
    }

    #[test]
    fn test_sender_id_rejects_bad_input() {
        assert!(SenderId::new("").is_err());
        assert!(SenderId::new("ABCDEFGHIJKLMNOPQ").is_err());
        assert!(SenderId::new("caf\u{e9}").is_err());
        assert!(SenderId::new("tab\there").is_err());
        assert!(SenderId::new("ABCDEFGHIJKLMNOP").is_ok());
    }

    #[test]
    fn test_sender_id_from_wire() {
        let mut raw = [0u8; SENDER_ID_SIZE];
        raw[..4].copy_from_slice(b"V002");
        assert_eq!(SenderId::from_wire(raw).unwrap().as_str(), "V002");

        // Garbage after the terminator would make two wire encodings map to one id.
        raw[10] = b'X';
        assert!(SenderId::from_wire(raw).is_err());

        assert!(SenderId::from_wire([0u8; SENDER_ID_SIZE]).is_err());
        assert!(SenderId::from_wire([0xFFu8; SENDER_ID_SIZE]).is_err());
    }

    #[test]
    fn test_message_type_discriminators() {
        for kind in MessageType::ALL {
            assert_eq!(MessageType::try_from(kind.as_u8()).unwrap(), kind);
        }
        assert!(matches!(
            MessageType::try_from(0x7F),
            Err(ProtocolError::UnknownType(0x7F))
        ));
    }

    #[test]
    fn test_sender_id_serializes_as_string() {
        let id = SenderId::new("SDV002").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"SDV002\"");
        let back: SenderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
