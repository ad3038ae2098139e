//! The reconciliation worker.
//!
//! One task per started reconciler owns the desired and the last reconciled
//! snapshot. Nothing else reads or writes them, so they need no lock. The loop
//! reacts to three events:
//!
//! - an update arrives: apply it to the desired state, attempt a
//!   reconciliation, send the outcome back to the producer
//! - stop is requested: return, which fires the completion signal
//! - the retry ticker fires: re-attempt if the last attempt failed
//!
//! Reconciliation is skipped if:
//!
//! - the leader lease isn't held
//! - no configuration has been received yet
//! - the desired state equals the last reconciled state
//!
//! All three events are polled without priority, so an update and a retry
//! tick that become ready together are served in random order.

use std::sync::Arc;
use std::time::Duration;

use cfgward_core::{sort_resources, Resource};
use itertools::Itertools;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::leader::LeaderElector;
use crate::ports::{ApplyPort, ResourceGenerator};
use crate::protocol::UpdateRequest;
use crate::signal::{Signal, Trigger};
use crate::snapshot::Snapshot;

const RECONCILING: &str = "processing reconciliation";

/// Reconciliation worker state. Lives exactly as long as the loop.
pub(crate) struct Worker {
    generator: Arc<dyn ResourceGenerator>,
    apply: Arc<dyn ApplyPort>,
    leader: Arc<dyn LeaderElector>,
    retry_interval: Duration,
    /// Fires when a stop has been requested.
    stop: Signal,
    desired: Snapshot,
    reconciled: Snapshot,
}

impl Worker {
    pub(crate) fn new(
        generator: Arc<dyn ResourceGenerator>,
        apply: Arc<dyn ApplyPort>,
        leader: Arc<dyn LeaderElector>,
        retry_interval: Duration,
        stop: Signal,
    ) -> Self {
        Self {
            generator,
            apply,
            leader,
            retry_interval,
            stop,
            desired: Snapshot::default(),
            reconciled: Snapshot::default(),
        }
    }

    /// Run the loop until a stop is requested.
    ///
    /// `done` is dropped on return, which fires the completion signal.
    pub(crate) async fn run(mut self, mut updates: mpsc::Receiver<UpdateRequest>, done: Trigger) {
        info!("Starting reconciliation loop");

        let stop = self.stop.clone();
        let mut retry = tokio::time::interval(self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        retry.tick().await;

        let mut last_failed = false;

        loop {
            tokio::select! {
                Some(request) = updates.recv() => {
                    last_failed = self.handle_update(request).await.is_err();
                }

                () = stop.fired() => break,

                _ = retry.tick() => {
                    if !last_failed {
                        continue;
                    }
                    match self.run_reconciliation().await {
                        Ok(()) => {
                            info!("Recovered from previously failed reconciliation");
                            last_failed = false;
                        }
                        Err(e) => {
                            error!(
                                error = %e,
                                "Failed to recover from previously failed reconciliation"
                            );
                        }
                    }
                }
            }
        }

        info!("Reconciliation loop done");
        done.fire();
    }

    /// Apply one update and reply with the outcome of the attempt that follows.
    async fn handle_update(&mut self, request: UpdateRequest) -> Result<()> {
        let UpdateRequest { update, reply } = request;
        update(&mut self.desired);

        let outcome = self.run_reconciliation().await;
        if let Err(e) = &outcome {
            if !e.is_stopped_concurrently() {
                warn!(error = %e, "Failed to reconcile worker configuration");
            }
        }

        // The producer may have given up already; the outcome still counts.
        let _ = reply.send(outcome.clone());
        outcome
    }

    /// A single reconciliation attempt of the current desired state.
    pub(crate) async fn run_reconciliation(&mut self) -> Result<()> {
        if self.stop.has_fired() {
            return Err(Error::stopped_concurrently(RECONCILING));
        }

        if !self.leader.is_leader() {
            debug!("Skipping reconciliation, not the leader");
            return Ok(());
        }

        if !self.desired.is_complete() {
            debug!("Skipping reconciliation, snapshot not yet complete");
            return Ok(());
        }

        if self.desired == self.reconciled {
            debug!("Skipping reconciliation, nothing changed");
            return Ok(());
        }

        let state_to_reconcile = self.desired.clone();
        let mut resources = self
            .generator
            .generate(&state_to_reconcile)
            .map_err(Error::into_generation)?;
        sort_resources(&mut resources);
        trace!(
            keys = %resources.iter().map(Resource::key).join(", "),
            "Generated resources"
        );

        debug!(
            resources = resources.len(),
            serial = state_to_reconcile.serial,
            "Updating worker configuration ..."
        );

        tokio::select! {
            applied = self.apply.apply(&resources) => applied.map_err(Error::into_apply)?,
            () = self.stop.fired() => return Err(Error::stopped_concurrently(RECONCILING)),
        }

        self.reconciled = state_to_reconcile;

        info!("Worker configuration updated");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn reconciled(&self) -> &Snapshot {
        &self.reconciled
    }

    #[cfg(test)]
    pub(crate) fn desired_mut(&mut self) -> &mut Snapshot {
        &mut self.desired
    }
}
