//! Project collaborator seam.
//!
//! The project aggregates nodes sharing a topology and owns persistence.
//! Nodes only need its identity and a way to schedule a topology dump, so
//! that is all the trait exposes; the real project lives in the hosting
//! server.

use netlab_core::ProjectId;

/// Handle to the project owning a node.
pub trait Project: Send + Sync {
    /// The project's identifier.
    fn id(&self) -> ProjectId;

    /// Schedule a persistence pass of the topology. Fire-and-forget; the
    /// node does not wait for the dump to complete.
    fn schedule_dump(&self);
}
