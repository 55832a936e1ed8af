//! Common types for the environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a delivered event.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random EventId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Raw message pulled off a queue.
///
/// The body is opaque bytes; the ingestion layer decides how to parse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Raw message body
    pub body: Vec<u8>,

    /// Monotonic delivery counter assigned by the source
    pub delivery_tag: u64,
}

impl QueueMessage {
    /// Creates a new message from body bytes.
    pub fn new(body: impl Into<Vec<u8>>, delivery_tag: u64) -> Self {
        Self {
            body: body.into(),
            delivery_tag,
        }
    }

    /// Returns the body size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }
}
