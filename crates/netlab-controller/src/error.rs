//! Error types for node orchestration.

use netlab_compute::ComputeError;
use thiserror::Error;

use crate::schema::NodeType;

/// A result type using `ControllerError`.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Errors that can occur during node orchestration.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The node type string does not name a supported emulator. Raised
    /// before any dispatch.
    #[error("unknown node type {0:?}")]
    UnknownNodeType(String),

    /// The operation only exists for a specific emulator type.
    #[error("operation {operation:?} is not supported for {node_type} nodes")]
    UnsupportedOperation {
        /// The node's actual type.
        node_type: NodeType,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The compute answered successfully but the body did not have the
    /// expected shape.
    #[error("malformed compute response: {0}")]
    MalformedResponse(String),

    /// Compute communication failed. Never retried automatically, except
    /// for the one-shot missing-image recovery during creation.
    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl ControllerError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::UnknownNodeType(_) | Self::UnsupportedOperation { .. } => 400,
            Self::MalformedResponse(_) => 502,
            Self::Compute(error) => match error {
                ComputeError::Http { status, .. } => *status,
                ComputeError::ImageMissing { .. } => 409,
                ComputeError::ImageNotFound { .. } => 404,
                ComputeError::Transport(_) => 504,
                ComputeError::Io(_) | ComputeError::InvalidBaseUrl { .. } => 500,
            },
        }
    }
}
