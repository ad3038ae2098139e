//! External collaborators of the reconciliation worker.
//!
//! The worker calls these synchronously and serially, so implementations need
//! no synchronization of their own on its behalf.

use std::sync::Arc;

use async_trait::async_trait;
use cfgward_core::Resource;
use tracing::debug;

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Translates a snapshot into the resources that realize it.
///
/// Must be a pure function of its input. The worker sorts the output by
/// `kind/namespace/name` before applying it.
pub trait ResourceGenerator: Send + Sync {
    /// Generate the resources for `snapshot`.
    ///
    /// # Errors
    ///
    /// Any error is reported as a failed reconciliation and retried.
    fn generate(&self, snapshot: &Snapshot) -> Result<Vec<Resource>>;
}

impl<F> ResourceGenerator for F
where
    F: Fn(&Snapshot) -> Result<Vec<Resource>> + Send + Sync,
{
    fn generate(&self, snapshot: &Snapshot) -> Result<Vec<Resource>> {
        self(snapshot)
    }
}

/// Pushes an ordered resource list to the managed system.
///
/// Must be idempotent and must not retry internally; retries belong to the
/// worker.
#[async_trait]
pub trait ApplyPort: Send + Sync {
    /// Apply `resources`.
    ///
    /// # Errors
    ///
    /// Any error is reported as a failed reconciliation and retried.
    async fn apply(&self, resources: &[Resource]) -> Result<()>;
}

/// A named set of resources applied as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub resources: Vec<Resource>,
    /// Remove previously applied members of the stack that are no longer listed.
    pub prune: bool,
}

/// Transport that applies stacks to the managed system.
#[async_trait]
pub trait StackClient: Send + Sync {
    /// Apply `stack`.
    ///
    /// # Errors
    ///
    /// Returns an error if the managed system rejected the stack.
    async fn apply_stack(&self, stack: &Stack) -> Result<()>;
}

/// Hands out clients for the managed system.
pub trait ClientFactory: Send + Sync {
    /// Get a stack client.
    ///
    /// # Errors
    ///
    /// Returns an error if no client can be constructed right now.
    fn stack_client(&self) -> Result<Arc<dyn StackClient>>;
}

/// The apply port bound by `Reconciler::init`.
///
/// Resolves a client on every call, so a client that cannot be built yet
/// fails that one attempt instead of the whole reconciler.
pub struct StackApplier {
    name: String,
    factory: Arc<dyn ClientFactory>,
}

impl StackApplier {
    pub fn new(name: impl Into<String>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

#[async_trait]
impl ApplyPort for StackApplier {
    async fn apply(&self, resources: &[Resource]) -> Result<()> {
        let client = self.factory.stack_client()?;
        let stack = Stack {
            name: self.name.clone(),
            resources: resources.to_vec(),
            prune: true,
        };
        debug!(stack = %stack.name, resources = stack.resources.len(), "Applying stack");
        client.apply_stack(&stack).await
    }
}
