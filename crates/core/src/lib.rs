//! Core types for cfgward.
//!
//! - **Cluster configuration**: the document producers hand to the reconciler
//! - **Resources**: the generic, deterministically ordered objects pushed to
//!   the managed system
//! - **Errors**: typed, recoverable failures

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod resource;

pub use config::{ClusterConfig, ClusterSpec, NetworkSpec, WorkerProfile};
pub use error::{Error, Result};
pub use resource::{common_labels, sort_resources, Resource, ResourceKey};
