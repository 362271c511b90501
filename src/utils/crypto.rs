//! Beacon authentication primitives.
//!
//! Beacons are authenticated, not encrypted: every node on the mesh shares one
//! symmetric key and tags each datagram with HMAC-SHA-256 over the signed
//! prefix. Tag comparison goes through `subtle` so a mismatch at byte 0 costs
//! the same as a mismatch at byte 31.

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{constants, ProtocolError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Authentication tag size in bytes.
pub const TAG_SIZE: usize = 32;

/// Minimum accepted key length in bytes.
pub const MIN_KEY_SIZE: usize = 16;

/// Maximum accepted key length in bytes (one SHA-256 block).
pub const MAX_KEY_SIZE: usize = 64;

/// Shared symmetric key. Zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthKey {
    bytes: Vec<u8>,
}

impl AuthKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidKey` if the length is outside 16..=64 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_KEY_SIZE {
            return Err(ProtocolError::InvalidKey(constants::ERR_KEY_TOO_SHORT.into()));
        }
        if bytes.len() > MAX_KEY_SIZE {
            return Err(ProtocolError::InvalidKey(constants::ERR_KEY_TOO_LONG.into()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse a hex-encoded key as found in provisioning files.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let mut raw = hex::decode(hex_key.trim())
            .map_err(|_| ProtocolError::InvalidKey(constants::ERR_KEY_NOT_HEX.into()))?;
        let key = Self::from_bytes(&raw);
        raw.zeroize();
        key
    }

    /// Generate a fresh 32-byte key from the OS RNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = vec![0u8; 32];
        getrandom::fill(&mut bytes)
            .map_err(|_| ProtocolError::InvalidKey(constants::ERR_KEY_RNG.into()))?;
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex form, for writing into a provisioning file.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    fn mac(&self) -> HmacSha256 {
        // Keys no longer than a block are zero-padded by HMAC itself.
        let mut block = [0u8; MAX_KEY_SIZE];
        block[..self.bytes.len()].copy_from_slice(&self.bytes);
        let key: &Key<HmacSha256> = (&block).into();
        let mac = <HmacSha256 as hmac::digest::KeyInit>::new(key);
        block.zeroize();
        mac
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Compute the tag over `signed`.
pub fn compute_tag(key: &AuthKey, signed: &[u8]) -> [u8; TAG_SIZE] {
    let mut mac = key.mac();
    mac.update(signed);
    mac.finalize().into_bytes().into()
}

/// Recompute the tag over `signed` and compare against `tag` in constant time.
pub fn verify_tag(key: &AuthKey, signed: &[u8], tag: &[u8; TAG_SIZE]) -> bool {
    let computed = compute_tag(key, signed);
    computed.ct_eq(tag).into()
}
