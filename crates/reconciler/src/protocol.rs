//! Enqueue-and-await protocol between producers and the worker.
//!
//! A producer wraps its mutation with a private reply slot, places it on the
//! capacity-1 update queue, and waits for the outcome of the reconciliation
//! attempt that follows it. Both waits also end when the worker stops or when
//! the producer's [`Context`] fires.

use tokio::sync::{mpsc, oneshot};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::signal::Signal;
use crate::snapshot::Snapshot;

/// Updates waiting for pickup. One in flight caps producer-side buffering.
pub(crate) const QUEUE_CAPACITY: usize = 1;

const ENQUEUING: &str = "trying to enqueue state update";
const AWAITING: &str = "waiting for reconciliation to finish";

pub(crate) type UpdateFn = Box<dyn FnOnce(&mut Snapshot) + Send>;

/// A mutation of the desired state plus the slot its outcome is delivered to.
pub(crate) struct UpdateRequest {
    pub(crate) update: UpdateFn,
    pub(crate) reply: oneshot::Sender<Result<()>>,
}

/// What a producer needs to reach a running worker.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    pub(crate) updates: mpsc::Sender<UpdateRequest>,
    /// Fires once the worker loop has returned.
    pub(crate) stopped: Signal,
}

pub(crate) fn update_queue() -> (mpsc::Sender<UpdateRequest>, mpsc::Receiver<UpdateRequest>) {
    mpsc::channel(QUEUE_CAPACITY)
}

/// Enqueue `update` and wait for the reconciliation that follows it.
///
/// # Errors
///
/// Returns the outcome of the reconciliation attempt,
/// [`Error::StoppedConcurrently`] if the worker stops first, or
/// [`Error::Cancelled`] if `ctx` fires first.
pub(crate) async fn submit<F>(ctx: &Context, worker: &WorkerHandle, update: F) -> Result<()>
where
    F: FnOnce(&mut Snapshot) + Send + 'static,
{
    let (reply, outcome) = oneshot::channel();
    let request = UpdateRequest {
        update: Box::new(update),
        reply,
    };

    tokio::select! {
        sent = worker.updates.send(request) => {
            // The queue only closes once the worker is gone.
            if sent.is_err() {
                return Err(Error::stopped_concurrently(ENQUEUING));
            }
        }
        () = worker.stopped.fired() => return Err(Error::stopped_concurrently(ENQUEUING)),
        cause = ctx.done() => return Err(Error::cancelled(cause, ENQUEUING)),
    }

    tokio::select! {
        // A dropped reply slot means the worker went away holding the request.
        result = outcome => result.unwrap_or(Err(Error::stopped_concurrently(AWAITING))),
        () = worker.stopped.fired() => Err(Error::stopped_concurrently(AWAITING)),
        cause = ctx.done() => Err(Error::cancelled(cause, AWAITING)),
    }
}
