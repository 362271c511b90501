//! Bounded table of recently heard peers.
//!
//! Insertion into a full table is refused rather than evicting someone: under
//! a flood of distinct identities the table keeps the peers it already knows.
//! Updates to a known sender always succeed.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::core::message::{Kinematics, SenderId};
use crate::utils::time::Millis;

/// Last known state of one peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborRecord {
    pub sender_id: SenderId,
    pub kinematics: Kinematics,
    /// Local time the peer was last heard from
    pub last_seen: Millis,
    /// Set by an emergency alert; cleared only by eviction
    pub is_emergency: bool,
}

/// Result of [`NeighborTable::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Unknown sender and the table is at capacity
    Full,
}

#[derive(Debug)]
pub struct NeighborTable {
    records: HashMap<SenderId, NeighborRecord>,
    capacity: usize,
    staleness_ms: u32,
}

impl NeighborTable {
    pub fn new(capacity: usize, staleness_ms: u32) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
            capacity,
            staleness_ms,
        }
    }

    /// Update a known sender, or insert it if there is room.
    pub fn upsert(&mut self, sender: &SenderId, kinematics: Kinematics, now: Millis) -> UpsertOutcome {
        if let Some(record) = self.records.get_mut(sender) {
            record.kinematics = kinematics;
            record.last_seen = now;
            return UpsertOutcome::Updated;
        }

        if self.records.len() >= self.capacity {
            debug!(%sender, capacity = self.capacity, "Neighbor table full");
            return UpsertOutcome::Full;
        }

        self.records.insert(
            *sender,
            NeighborRecord {
                sender_id: *sender,
                kinematics,
                last_seen: now,
                is_emergency: false,
            },
        );
        debug!(%sender, "Neighbor added");
        UpsertOutcome::Inserted
    }

    /// Refresh `last_seen` of a known sender. Returns whether it was known.
    pub fn touch(&mut self, sender: &SenderId, now: Millis) -> bool {
        match self.records.get_mut(sender) {
            Some(record) => {
                record.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Flag a known sender as an active emergency vehicle.
    pub fn mark_emergency(&mut self, sender: &SenderId) -> bool {
        match self.records.get_mut(sender) {
            Some(record) => {
                record.is_emergency = true;
                true
            }
            None => false,
        }
    }

    /// Remove every record not heard from for longer than the staleness threshold.
    pub fn evict_stale(&mut self, now: Millis) -> usize {
        let staleness = self.staleness_ms;
        let before = self.records.len();
        self.records.retain(|sender, record| {
            let keep = now.elapsed_since(record.last_seen) <= staleness;
            if !keep {
                debug!(%sender, "Neighbor evicted (stale)");
            }
            keep
        });
        before - self.records.len()
    }

    pub fn get(&self, sender: &SenderId) -> Option<&NeighborRecord> {
        self.records.get(sender)
    }

    pub fn contains(&self, sender: &SenderId) -> bool {
        self.records.contains_key(sender)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborRecord> {
        self.records.values()
    }

    /// Owned copy of every record, ordered by sender id.
    pub fn snapshot(&self) -> Vec<NeighborRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.sender_id.cmp(&b.sender_id));
        records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
