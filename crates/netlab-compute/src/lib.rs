//! Compute-facing HTTP layer for the netlab controller.
//!
//! A *compute* is the remote worker agent that actually runs emulated
//! devices. The controller talks to it over a small JSON/HTTP API; this
//! crate provides that client plus the image provisioning path used to
//! recover from a compute that is missing a disk or ROM image.
//!
//! - [`ComputeClient`]: the trait the controller programs against; tests
//!   substitute mock implementations.
//! - [`HttpComputeClient`]: the reqwest-backed production implementation.
//! - [`ImageStore`] / [`DirectoryImageStore`]: local image lookup.
//! - [`ImageProvisioner`]: uploads a named image to a compute on demand.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod error;
pub mod images;

pub use client::{ComputeClient, ComputeResponse, HttpComputeClient, RequestTimeout};
pub use config::ComputeConfig;
pub use error::{ComputeError, Result};
pub use images::{DirectoryImageStore, ImageProvisioner, ImageStore};
