//! One-shot, multi-waiter signals.
//!
//! A [`Signal`] fires exactly once, when its [`Trigger`] is pulled or dropped.
//! Any number of clones may wait on it, before or after it fires.

use tokio::sync::watch;

/// The sending half. Firing consumes it.
#[derive(Debug)]
pub(crate) struct Trigger(watch::Sender<()>);

/// The waiting half.
#[derive(Debug, Clone)]
pub(crate) struct Signal(watch::Receiver<()>);

pub(crate) fn signal() -> (Trigger, Signal) {
    let (tx, rx) = watch::channel(());
    (Trigger(tx), Signal(rx))
}

impl Trigger {
    pub(crate) fn fire(self) {
        let Self(sender) = self;
        drop(sender);
    }
}

impl Signal {
    /// Whether the signal has fired already.
    pub(crate) fn has_fired(&self) -> bool {
        self.0.has_changed().is_err()
    }

    /// Resolves once the signal has fired.
    pub(crate) async fn fired(&self) {
        let mut rx = self.0.clone();
        while rx.changed().await.is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_signal_fires_on_trigger() {
        let (trigger, signal) = signal();
        assert!(!signal.has_fired());

        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.fired().await });

        trigger.fire();
        assert!(signal.has_fired());
        assert!(tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_signal_fires_when_trigger_dropped() {
        let (trigger, signal) = signal();
        drop(trigger);
        signal.fired().await;
        assert!(signal.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_pending_while_trigger_alive() {
        let (_trigger, signal) = signal();
        let waited = tokio::time::timeout(Duration::from_secs(5), signal.fired()).await;
        assert!(waited.is_err());
    }
}
