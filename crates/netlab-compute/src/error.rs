//! Error types for compute communication.

use thiserror::Error;

/// A result type using `ComputeError`.
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Errors that can occur when talking to a compute agent.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// The request never produced an HTTP response (connection refused,
    /// DNS failure, timeout, protocol error).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The compute answered with a non-success status.
    #[error("compute returned status {status}: {detail}")]
    Http {
        /// HTTP status code returned by the compute.
        status: u16,
        /// Error detail extracted from the response body, if any.
        detail: String,
    },

    /// The compute rejected an instance creation because a required disk
    /// or ROM image is not present on its side (HTTP 409 with
    /// `exception == "ImageMissingError"`). This is the one recoverable
    /// failure: the caller may upload the image and retry once.
    #[error("compute is missing image {image:?}")]
    ImageMissing {
        /// Name of the image the compute asked for.
        image: String,
    },

    /// The named image could not be resolved in the local image store.
    #[error("image {filename:?} not found in the local image store")]
    ImageNotFound {
        /// The image filename that failed to resolve.
        filename: String,
    },

    /// Local I/O failure while reading an image for upload.
    #[error("image read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The compute base URL could not be parsed.
    #[error("invalid compute base URL {url:?}")]
    InvalidBaseUrl {
        /// The offending URL.
        url: String,
    },
}

impl ComputeError {
    /// Returns true if this error is the recoverable missing-image case.
    #[must_use]
    pub const fn is_image_missing(&self) -> bool {
        matches!(self, Self::ImageMissing { .. })
    }
}
