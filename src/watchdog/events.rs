use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stamp::Stamp;

/// One observed heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Checkpoint id of the entity that emitted the heartbeat.
    pub entity_id: i32,
    /// Sender assigned timestamp
    pub timestamp: Stamp,
}

impl HeartbeatRecord {
    pub fn new(entity_id: i32, timestamp: Stamp) -> Self {
        Self {
            entity_id,
            timestamp,
        }
    }
}

/// Aggregate liveliness change as reported by the liveliness monitor.
/// Carries no entity identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LivelinessEvent {
    pub alive_count: i32,
    pub not_alive_count: i32,
    pub alive_count_change: i32,
    pub not_alive_count_change: i32,
}

impl LivelinessEvent {
    /// Whether the set of alive entities shrank with this event.
    pub fn is_loss(&self) -> bool {
        self.alive_count_change < 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotification {
    pub event_id: Uuid,
    /// Time the loss was detected.
    pub reported_at: Stamp,
    pub entity_id: i32,
    /// Timestamp of the last heartbeat seen from the entity.
    pub last_seen: Stamp,
}
