//! Notification collaborator seam.
//!
//! The controller fans events out to connected clients (WebSocket,
//! pub-sub). Only the emit contract matters here; transport lives in the
//! hosting server.

use serde_json::Value;

/// Event name emitted after an observable node change.
pub const NODE_UPDATED: &str = "node.updated";

/// Sink for controller events.
pub trait NotificationSink: Send + Sync {
    /// Emit an event with its JSON payload. Must not block.
    fn emit(&self, event: &str, payload: Value);
}
