//! This node's signing state: identity, shared key and outgoing nonce counter.
//!
//! A nonce must never repeat under one key, including across restarts. The
//! counter lives in memory only; whoever owns the node must persist
//! [`SecurityContext::pending_nonce`] and hand it back through
//! [`SecurityContext::resume`]. [`load_nonce_mark`] and [`save_nonce_mark`]
//! keep it in a small text file.

use std::path::Path;
use tracing::{info, warn};

use crate::core::message::SenderId;
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::AuthKey;

/// Identity, key and outgoing nonce counter of the local node.
///
/// Owned by the engine and mutated only on the send path.
#[derive(Debug)]
pub struct SecurityContext {
    node_id: SenderId,
    key: AuthKey,
    /// `None` once `u32::MAX` has been issued.
    next_nonce: Option<u32>,
    generation: u32,
}

impl SecurityContext {
    /// Fresh key: the counter starts at 0.
    pub fn new(node_id: SenderId, key: AuthKey) -> Self {
        Self::resume(node_id, key, 0)
    }

    /// Continue a key's sequence after a restart, issuing `next_nonce` first.
    pub fn resume(node_id: SenderId, key: AuthKey, next_nonce: u32) -> Self {
        if next_nonce > 0 {
            info!(node = %node_id, next_nonce, "Resuming nonce sequence");
        }
        Self {
            node_id,
            key,
            next_nonce: Some(next_nonce),
            generation: 0,
        }
    }

    #[inline]
    pub fn node_id(&self) -> &SenderId {
        &self.node_id
    }

    #[inline]
    pub fn key(&self) -> &AuthKey {
        &self.key
    }

    /// Key generation, bumped by every [`rekey`](Self::rekey).
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Issue the next outgoing nonce.
    ///
    /// # Errors
    /// `NonceExhausted` once the 32-bit range is used up; sending must stop
    /// until the node is re-keyed.
    pub fn next_nonce(&mut self) -> Result<u32> {
        let nonce = self.next_nonce.ok_or(ProtocolError::NonceExhausted)?;
        self.next_nonce = nonce.checked_add(1);
        if self.next_nonce.is_none() {
            warn!(node = %self.node_id, "Last nonce issued for this key - re-key required");
        }
        Ok(nonce)
    }

    /// The nonce the next send will carry, `None` once exhausted. This is the
    /// value to persist.
    pub fn pending_nonce(&self) -> Option<u32> {
        self.next_nonce
    }

    /// Nonces left before exhaustion.
    pub fn remaining(&self) -> u64 {
        self.next_nonce
            .map(|n| u64::from(u32::MAX) - u64::from(n) + 1)
            .unwrap_or(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_nonce.is_none()
    }

    /// Install a new key and restart the nonce sequence.
    pub fn rekey(&mut self, key: AuthKey) {
        self.key = key;
        self.next_nonce = Some(0);
        self.generation = self.generation.wrapping_add(1);
        info!(node = %self.node_id, generation = self.generation, "Security context re-keyed");
    }
}

/// Read a nonce mark written by [`save_nonce_mark`]. A missing file means the
/// key has never been used here.
///
/// # Errors
/// `Io` if the file exists but cannot be read, `ConfigError` if it does not
/// hold a number.
pub fn load_nonce_mark<P: AsRef<Path>>(path: P) -> Result<Option<u32>> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    raw.trim().parse::<u32>().map(Some).map_err(|e| {
        ProtocolError::ConfigError(format!("Bad nonce mark in {}: {e}", path.display()))
    })
}

/// Persist the next nonce to issue.
pub fn save_nonce_mark<P: AsRef<Path>>(path: P, next_nonce: u32) -> Result<()> {
    std::fs::write(path, format!("{next_nonce}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SecurityContext {
        SecurityContext::new(
            SenderId::new("V001").unwrap(),
            AuthKey::from_bytes(&[1u8; 32]).unwrap(),
        )
    }

    #[test]
    fn test_nonces_strictly_increase() {
        let mut ctx = context();
        let mut last = None;
        for _ in 0..1_000 {
            let n = ctx.next_nonce().unwrap();
            if let Some(prev) = last {
                assert!(n > prev);
            }
            last = Some(n);
        }
    }

    #[test]
    fn test_exhaustion_and_rekey() {
        let mut ctx = SecurityContext::resume(
            SenderId::new("V001").unwrap(),
            AuthKey::from_bytes(&[1u8; 32]).unwrap(),
            u32::MAX - 1,
        );
        assert_eq!(ctx.remaining(), 2);
        assert_eq!(ctx.next_nonce().unwrap(), u32::MAX - 1);
        assert_eq!(ctx.next_nonce().unwrap(), u32::MAX);
        assert!(ctx.is_exhausted());
        assert!(matches!(ctx.next_nonce(), Err(ProtocolError::NonceExhausted)));

        ctx.rekey(AuthKey::from_bytes(&[2u8; 32]).unwrap());
        assert_eq!(ctx.generation(), 1);
        assert_eq!(ctx.next_nonce().unwrap(), 0);
    }

    #[test]
    fn test_resume_continues_sequence() {
        let mut ctx = context();
        for _ in 0..5 {
            ctx.next_nonce().unwrap();
        }
        let mark = ctx.pending_nonce().unwrap();
        assert_eq!(mark, 5);

        let mut resumed = SecurityContext::resume(
            SenderId::new("V001").unwrap(),
            AuthKey::from_bytes(&[1u8; 32]).unwrap(),
            mark,
        );
        assert_eq!(resumed.next_nonce().unwrap(), 5);
    }

    #[test]
    fn test_nonce_mark_file() {
        let path = std::env::temp_dir().join(format!("v2x-nonce-{}.mark", std::process::id()));
        let _ = std::fs::remove_file(&path);
        assert_eq!(load_nonce_mark(&path).unwrap(), None);

        save_nonce_mark(&path, 12_345).unwrap();
        assert_eq!(load_nonce_mark(&path).unwrap(), Some(12_345));

        std::fs::write(&path, "garbage").unwrap();
        assert!(matches!(load_nonce_mark(&path), Err(ProtocolError::ConfigError(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
