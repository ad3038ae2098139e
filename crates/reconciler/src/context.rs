//! Caller-side cancellation for blocking reconciler operations.
//!
//! Every operation that may wait on the reconciliation worker takes a
//! [`Context`]. A context fires either when its [`CancelHandle`] is used or
//! when its deadline passes; the wait then returns [`Error::Cancelled`]
//! carrying the [`CancelCause`].
//!
//! Dropping the future of an in-flight operation is an equally valid way to
//! abandon it. Neither path has side effects on the reconciler's state.
//!
//! [`Error::Cancelled`]: crate::Error::Cancelled

use std::fmt;
use std::future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller cancelled explicitly.
    Cancelled,
    /// The caller's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "context canceled"),
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation scope for a single caller.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels the [`Context`] it was created with. Dropping it does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Context {
    /// A context that never fires.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that fires once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// A context that fires when the returned handle is used.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            deadline: None,
            cancel: Some(rx),
        };
        (ctx, CancelHandle { tx })
    }

    /// Narrow this context's deadline to at most `timeout` from now.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        // An unrepresentable instant is as good as no deadline at all.
        match Instant::now().checked_add(timeout) {
            Some(at) => self.deadline(at),
            None => self,
        }
    }

    /// Narrow this context's deadline to at most `at`.
    #[must_use]
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(at, |current| current.min(at)));
        self
    }

    /// The cause, if the context has fired already.
    pub fn err(&self) -> Option<CancelCause> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|rx| *rx.borrow())
        {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context fires.
    pub async fn done(&self) -> CancelCause {
        let cancelled = async {
            if let Some(mut rx) = self.cancel.clone() {
                let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
                if fired {
                    return;
                }
            }
            // No handle, or the handle was dropped without cancelling.
            future::pending::<()>().await;
        };

        let expired = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = cancelled => CancelCause::Cancelled,
            () = expired => CancelCause::DeadlineExceeded,
        }
    }
}

impl CancelHandle {
    /// Fire the associated context. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_background_never_fires() {
        let ctx = Context::background();
        assert_eq!(ctx.err(), None);
        let waited = tokio::time::timeout(Duration::from_secs(3600), ctx.done()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_with_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.err(), None);
        assert_eq!(ctx.done().await, CancelCause::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(CancelCause::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_handle_fires_context() {
        let (ctx, handle) = Context::with_cancel();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.done().await });

        handle.cancel();
        handle.cancel();

        assert_eq!(task.await.ok(), Some(CancelCause::Cancelled));
        assert_eq!(ctx.err(), Some(CancelCause::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::with_cancel();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_secs(10), ctx.done()).await;
        assert!(waited.is_err());
        assert_eq!(ctx.err(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_narrows() {
        let ctx = Context::with_timeout(Duration::from_secs(5)).timeout(Duration::from_secs(50));
        let started = Instant::now();
        ctx.done().await;
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_cause_display() {
        assert_eq!(CancelCause::Cancelled.to_string(), "context canceled");
        assert_eq!(
            CancelCause::DeadlineExceeded.to_string(),
            "context deadline exceeded"
        );
    }
}
