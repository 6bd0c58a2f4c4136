//! Controller-side node lifecycle orchestration for netlab.
//!
//! This crate owns the controller's representation of an emulated-network
//! node and the state-reconciliation protocol against the remote compute
//! that actually runs it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                 REST server / project layer           │
//! └───────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌───────────────────────────────────────────────────────┐
//! │                         Node                          │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────┐   │
//! │  │  Schema    │  │  Reconciler  │  │ Shadow state │   │
//! │  │ (per type) │  │ (pure diff)  │  │ (echo-only)  │   │
//! │  └────────────┘  └──────────────┘  └──────────────┘   │
//! └───────────────────────────────────────────────────────┘
//!          │                  │                  │
//!          ▼                  ▼                  ▼
//!   ┌────────────┐    ┌──────────────┐   ┌──────────────┐
//!   │  Compute   │    │   Project    │   │ Notification │
//!   │  (HTTP)    │    │ (dump hook)  │   │    sink      │
//!   └────────────┘    └──────────────┘   └──────────────┘
//! ```
//!
//! Dispatch is selective: controller-only changes (geometry, symbol,
//! label, unknown property keys) never touch the network; compute-relevant
//! changes are sent as a minimal diff, and the compute's echo is the only
//! thing allowed to overwrite shadow state. The one automatic recovery is
//! the missing-image path during creation: provision the image, retry
//! once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod node;
pub mod notification;
pub mod project;
pub mod reconcile;
pub mod schema;
pub mod types;

pub use error::{ControllerError, Result};
pub use node::{Node, NodeOptions};
pub use notification::{NotificationSink, NODE_UPDATED};
pub use project::Project;
pub use reconcile::{NodePatch, Reconciliation};
pub use schema::{NodeType, NodeTypeSchema};
pub use types::{Label, LabelPatch, NodeStatus, PropertyMap};
