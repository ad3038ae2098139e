//! Leader-gated reconciliation of worker configuration.
//!
//! This crate turns a changing cluster configuration into applied resources:
//!
//! - **Desired State**: the latest configuration, plus a serial that forces
//!   re-application after every lease acquisition
//! - **Reconciled State**: the last desired state that was applied successfully
//! - **Worker**: a single task that owns both, applies updates in order and
//!   reconciles whenever they differ
//! - **Retries**: failed reconciliations are retried on a fixed interval
//!   without waiting for new updates
//!
//! Only the instance holding the leader lease applies anything.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfgward_reconciler::{Context, LeaseFlag, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> cfgward_reconciler::Result<()> {
//!     let leader = Arc::new(LeaseFlag::new());
//!     let reconciler = Reconciler::builder()
//!         .with_generator(Arc::new(generate_worker_config))
//!         .with_leader_elector(leader.clone())
//!         .with_client_factory(Arc::new(client_factory))
//!         .build()?;
//!
//!     reconciler.init()?;
//!     reconciler.start()?;
//!     leader.acquire();
//!
//!     let cluster = cfgward_core::ClusterConfig::from_yaml_str(&source)?;
//!     reconciler.reconcile(&Context::background(), &cluster).await?;
//!
//!     reconciler.stop().await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod context;
pub mod error;
pub mod leader;
pub mod ports;
mod protocol;
pub mod reconciler;
mod signal;
pub mod snapshot;
mod worker;

// Re-export main types
pub use context::{CancelCause, CancelHandle, Context};
pub use error::{Error, Result};
pub use leader::{AlwaysLeader, LeaderElector, LeaseCallback, LeaseFlag};
pub use ports::{ApplyPort, ClientFactory, ResourceGenerator, Stack, StackApplier, StackClient};
pub use reconciler::{LifecycleState, Reconciler, ReconcilerBuilder, ReconcilerConfig, COMPONENT};
pub use snapshot::{take_config_snapshot, ConfigSnapshot, Profile, Snapshot};
