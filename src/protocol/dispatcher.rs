use crate::core::message::{Kinematics, MessageType, SenderId};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::time::Millis;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// What a forwarded record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A peer's beacon that passed validation
    NeighborUpdate,
    /// This node's own outgoing beacon
    OwnBeacon,
    EmergencyAlert,
    HazardWarning,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::NeighborUpdate,
        RecordKind::OwnBeacon,
        RecordKind::EmergencyAlert,
        RecordKind::HazardWarning,
    ];

    /// Kind for a message this node sends. Alerts and hazards keep their own
    /// kind; a hazard's coordinates are not this node's position.
    pub fn outbound(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Beacon => RecordKind::OwnBeacon,
            MessageType::EmergencyAlert => RecordKind::EmergencyAlert,
            MessageType::HazardWarning => RecordKind::HazardWarning,
        }
    }

    /// Kind for a validated inbound message.
    pub fn inbound(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Beacon => RecordKind::NeighborUpdate,
            MessageType::EmergencyAlert => RecordKind::EmergencyAlert,
            MessageType::HazardWarning => RecordKind::HazardWarning,
        }
    }
}

/// Plain, already-authenticated fact handed to forwarding components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardRecord {
    pub kind: RecordKind,
    pub sender_id: SenderId,
    pub timestamp: Millis,
    pub nonce: u32,
    pub latitude: f32,
    pub longitude: f32,
    pub speed: f32,
    pub heading: f32,
    pub is_emergency: bool,
}

impl ForwardRecord {
    pub fn new(
        kind: RecordKind,
        sender_id: SenderId,
        timestamp: Millis,
        nonce: u32,
        kinematics: Kinematics,
        is_emergency: bool,
    ) -> Self {
        Self {
            kind,
            sender_id,
            timestamp,
            nonce,
            latitude: kinematics.latitude,
            longitude: kinematics.longitude,
            speed: kinematics.speed,
            heading: kinematics.heading,
            is_emergency,
        }
    }
}

type HandlerFn = dyn Fn(&ForwardRecord) -> Result<()> + Send + Sync + 'static;

/// Routes validated records to the forwarding components registered for their kind.
///
/// Handler failures stay on the forwarding side: they are logged and counted
/// by the caller, never turned into protocol rejections.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<RecordKind, Vec<Arc<HandlerFn>>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register<F>(&self, kind: RecordKind, handler: F) -> Result<()>
    where
        F: Fn(&ForwardRecord) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.entry(kind).or_default().push(Arc::new(handler));
        Ok(())
    }

    /// Register one handler for every record kind.
    pub fn register_all<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&ForwardRecord) -> Result<()> + Send + Sync + 'static,
    {
        let handler: Arc<HandlerFn> = Arc::new(handler);
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        for kind in RecordKind::ALL {
            handlers.entry(kind).or_default().push(Arc::clone(&handler));
        }
        Ok(())
    }

    /// Run every handler registered for `record.kind`.
    ///
    /// Returns how many handlers failed.
    pub fn dispatch(&self, record: &ForwardRecord) -> Result<usize> {
        let handlers = self.handlers.read().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
        })?;

        let mut failures = 0;
        if let Some(list) = handlers.get(&record.kind) {
            for handler in list {
                if let Err(e) = handler(record) {
                    warn!(error = %e, kind = ?record.kind, sender = %record.sender_id, "Forwarding handler failed");
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }

    pub fn has_handlers(&self, kind: RecordKind) -> bool {
        self.handlers
            .read()
            .map(|h| h.get(&kind).is_some_and(|l| !l.is_empty()))
            .unwrap_or(false)
    }
}
