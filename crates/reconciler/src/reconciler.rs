//! Reconciler lifecycle: created, initialized, started, stopped.
//!
//! The lifecycle lock guards only the phase and the handles stored in it. It
//! is never held while an update is applied or a reconciliation attempted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cfgward_core::ClusterConfig;
use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, Instrument};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::leader::LeaderElector;
use crate::ports::{ApplyPort, ClientFactory, ResourceGenerator, StackApplier};
use crate::protocol::{self, WorkerHandle};
use crate::signal::{self, Signal, Trigger};
use crate::snapshot::{take_config_snapshot, Snapshot};
use crate::worker::Worker;

/// Value of the `component` field on everything the reconciler logs.
pub const COMPONENT: &str = "workerconfig";

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Interval at which a failed reconciliation is retried.
    pub retry_interval: Duration,
    /// Upper bound for the reconciliation forced by a lease acquisition.
    pub leader_reconcile_timeout: Duration,
    /// Name of the stack the generated resources are applied as.
    pub stack_name: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(60),
            leader_reconcile_timeout: Duration::from_secs(60),
            stack_name: "cfgward-worker-config".to_string(),
        }
    }
}

impl ReconcilerConfig {
    fn validate(&self) -> Result<()> {
        if self.retry_interval.is_zero() {
            return Err(Error::invalid_config("retry interval must be positive"));
        }
        if self.leader_reconcile_timeout.is_zero() {
            return Err(Error::invalid_config(
                "leader reconcile timeout must be positive",
            ));
        }
        if self.stack_name.trim().is_empty() {
            return Err(Error::invalid_config("stack name is empty"));
        }
        Ok(())
    }
}

/// Lifecycle state of a [`Reconciler`]. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Started,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initialized => write!(f, "initialized"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lifecycle state together with the handles valid in it.
enum Phase {
    Created,
    Initialized {
        apply: Arc<dyn ApplyPort>,
    },
    Started {
        worker: WorkerHandle,
        /// Dropping this requests the worker to stop.
        stop: Trigger,
    },
    Stopped {
        stopped: Signal,
    },
}

impl Phase {
    const fn state(&self) -> LifecycleState {
        match self {
            Self::Created => LifecycleState::Created,
            Self::Initialized { .. } => LifecycleState::Initialized,
            Self::Started { .. } => LifecycleState::Started,
            Self::Stopped { .. } => LifecycleState::Stopped,
        }
    }
}

/// Maintains the worker configuration resources of a cluster.
///
/// Producers hand in cluster configurations via [`Reconciler::reconcile`].
/// A single worker task turns them into resources and applies those, but
/// only while this instance holds the leader lease.
pub struct Reconciler {
    config: ReconcilerConfig,
    generator: Arc<dyn ResourceGenerator>,
    leader: Arc<dyn LeaderElector>,
    client_factory: Arc<dyn ClientFactory>,
    phase: Mutex<Phase>,
}

impl Reconciler {
    /// Create a new reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` is unusable.
    pub fn new(
        config: ReconcilerConfig,
        generator: Arc<dyn ResourceGenerator>,
        leader: Arc<dyn LeaderElector>,
        client_factory: Arc<dyn ClientFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            generator,
            leader,
            client_factory,
            phase: Mutex::new(Phase::Created),
        })
    }

    /// Get a builder.
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.phase.lock().state()
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Bind the apply port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the reconciler was just created.
    pub fn init(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        if !matches!(*phase, Phase::Created) {
            return Err(Error::invalid_state("initialize", phase.state()));
        }

        let apply = StackApplier::new(
            self.config.stack_name.clone(),
            Arc::clone(&self.client_factory),
        );
        *phase = Phase::Initialized {
            apply: Arc::new(apply),
        };
        Ok(())
    }

    /// Spawn the reconciliation worker and subscribe to lease acquisitions.
    ///
    /// Must be called from within a Tokio runtime, which the worker then runs on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the reconciler is initialized, or
    /// [`Error::InvalidConfig`] outside of a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        let Phase::Initialized { apply } = &*phase else {
            return Err(Error::invalid_state("start", phase.state()));
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::invalid_config(format!("no async runtime: {e}")))?;

        // Updates are sent via reconcile(). The worker picks them up, applies
        // them to the desired state and reconciles whenever that differs from
        // the last reconciled state.
        let (updates, queue) = protocol::update_queue();
        let (stop, stop_requested) = signal::signal();
        let (done, stopped) = signal::signal();

        let worker = Worker::new(
            Arc::clone(&self.generator),
            Arc::clone(apply),
            Arc::clone(&self.leader),
            self.config.retry_interval,
            stop_requested,
        );
        runtime.spawn(
            worker
                .run(queue, done)
                .instrument(info_span!("reconciler", component = COMPONENT)),
        );

        let handle = WorkerHandle { updates, stopped };
        self.enforce_reconciliation_on_lease(&runtime, handle.clone());

        *phase = Phase::Started {
            worker: handle,
            stop,
        };
        Ok(())
    }

    /// Force a reconciliation whenever the leader lease is acquired, even if
    /// nothing else changed.
    fn enforce_reconciliation_on_lease(
        &self,
        runtime: &tokio::runtime::Handle,
        worker: WorkerHandle,
    ) {
        let runtime = runtime.clone();
        let timeout = self.config.leader_reconcile_timeout;

        self.leader.add_acquired_lease_callback(Arc::new(move || {
            let worker = worker.clone();
            runtime.spawn(
                async move {
                    let ctx = Context::with_timeout(timeout);
                    let result = protocol::submit(&ctx, &worker, Snapshot::bump_serial).await;

                    // Being stopped concurrently is expected during shutdown.
                    if let Err(e) = result {
                        if !e.is_stopped_concurrently() {
                            error!(
                                error = %e,
                                "Failed to reconcile after having acquired the leader lease"
                            );
                        }
                    }
                }
                .instrument(info_span!("lease_acquired", component = COMPONENT)),
            );
        }));
    }

    /// Reconcile the worker configuration for `cluster` and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless started, [`Error::Config`] if the
    /// configuration is invalid, or whatever the reconciliation attempt,
    /// a concurrent stop, or `ctx` produce.
    pub async fn reconcile(&self, ctx: &Context, cluster: &ClusterConfig) -> Result<()> {
        let worker = {
            let phase = self.phase.lock();
            match &*phase {
                Phase::Started { worker, .. } => worker.clone(),
                other => return Err(Error::invalid_state("reconcile", other.state())),
            }
        };

        cluster.validate()?;
        let (config_snapshot, profiles) = take_config_snapshot(&cluster.spec)?;

        protocol::submit(ctx, &worker, move |s| {
            s.config_snapshot = Some(config_snapshot);
            s.profiles = profiles;
        })
        .await
    }

    /// Stop the worker and wait until it has exited. Idempotent once started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the reconciler was never started.
    pub async fn stop(&self) -> Result<()> {
        debug!(component = COMPONENT, "Stopping");

        let stopped = {
            let mut phase = self.phase.lock();
            let stopped = match &*phase {
                Phase::Started { worker, .. } => worker.stopped.clone(),
                Phase::Stopped { stopped } => stopped.clone(),
                other => return Err(Error::invalid_state("stop", other.state())),
            };
            let previous = std::mem::replace(
                &mut *phase,
                Phase::Stopped {
                    stopped: stopped.clone(),
                },
            );
            if let Phase::Started { stop, .. } = previous {
                stop.fire();
            }
            stopped
        };

        stopped.fired().await;
        info!(component = COMPONENT, "Stopped");
        Ok(())
    }
}

/// Builder for [`Reconciler`].
pub struct ReconcilerBuilder {
    generator: Option<Arc<dyn ResourceGenerator>>,
    leader: Option<Arc<dyn LeaderElector>>,
    client_factory: Option<Arc<dyn ClientFactory>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            generator: None,
            leader: None,
            client_factory: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the resource generator.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ResourceGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the leader elector.
    #[must_use]
    pub fn with_leader_elector(mut self, leader: Arc<dyn LeaderElector>) -> Self {
        self.leader = Some(leader);
        self
    }

    /// Set the client factory the apply port is bound to.
    #[must_use]
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the retry interval for failed reconciliations.
    #[must_use]
    pub const fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Set the timeout of lease-triggered reconciliations.
    #[must_use]
    pub const fn leader_reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.config.leader_reconcile_timeout = timeout;
        self
    }

    /// Set the stack name.
    #[must_use]
    pub fn stack_name(mut self, name: impl Into<String>) -> Self {
        self.config.stack_name = name.into();
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a collaborator is missing or the
    /// configuration is unusable.
    pub fn build(self) -> Result<Reconciler> {
        let generator = self
            .generator
            .ok_or_else(|| Error::invalid_config("resource generator is required"))?;
        let leader = self
            .leader
            .ok_or_else(|| Error::invalid_config("leader elector is required"))?;
        let client_factory = self
            .client_factory
            .ok_or_else(|| Error::invalid_config("client factory is required"))?;

        Reconciler::new(self.config, generator, leader, client_factory)
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
