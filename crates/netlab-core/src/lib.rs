//! Core types for the netlab controller.
//!
//! This crate provides the strongly-typed identifiers shared by the compute
//! and controller crates:
//!
//! - [`ProjectId`] / [`NodeId`]: UUID-backed topology identifiers
//! - [`ComputeId`]: opaque identifier of a remote compute agent
//!
//! # Example
//!
//! ```
//! use netlab_core::{NodeId, ProjectId};
//!
//! let project_id: ProjectId = "2a4e9a8c-7f7a-4a9b-9d55-d65b24d272a1".parse().unwrap();
//! let node_id = NodeId::generate();
//! assert_ne!(node_id.to_string(), project_id.to_string());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{ComputeId, IdError, NodeId, ProjectId};
