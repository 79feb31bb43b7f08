//! Notification and progress surfaces.
//!
//! The coordinator reports to two sinks: a [`Notifier`] for terminal
//! success/failure messages and a [`ProgressSurface`] for the busy indicator.
//! [`BusyGuard`] ties the busy indicator to a scope so it is cleared on every
//! exit path, including early returns, panics and dropped futures.

use std::sync::Arc;

pub trait Notifier: Send + Sync {
    fn notify_success(&self, message: &str);
    fn notify_error(&self, message: &str);
}

pub trait ProgressSurface: Send + Sync {
    fn set_busy(&self, label: &str);
    fn update_busy(&self, label: &str);
    fn clear_busy(&self);
}

/// Both surfaces, shared by every workflow of a coordinator or session.
#[derive(Clone)]
pub struct Signals {
    pub notifier: Arc<dyn Notifier>,
    pub progress: Arc<dyn ProgressSurface>,
}

impl Signals {
    pub fn new(notifier: Arc<dyn Notifier>, progress: Arc<dyn ProgressSurface>) -> Self {
        Self { notifier, progress }
    }

    /// Uses one object for both surfaces.
    pub fn from_shared<S>(signals: Arc<S>) -> Self
    where
        S: Notifier + ProgressSurface + 'static,
    {
        Self {
            notifier: signals.clone(),
            progress: signals,
        }
    }

    /// Reports through `tracing` only.
    pub fn log() -> Self {
        Self::from_shared(Arc::new(LogSignals))
    }

    pub fn busy(&self, label: &str) -> BusyGuard {
        BusyGuard::begin(self.progress.clone(), label)
    }
}

impl std::fmt::Debug for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signals").finish_non_exhaustive()
    }
}

/// Sets the busy indicator on creation and clears it exactly once on drop.
#[must_use = "the busy indicator is cleared as soon as the guard is dropped"]
pub struct BusyGuard {
    progress: Arc<dyn ProgressSurface>,
}

impl BusyGuard {
    pub fn begin(progress: Arc<dyn ProgressSurface>, label: &str) -> Self {
        progress.set_busy(label);
        Self { progress }
    }

    pub fn update(&self, label: &str) {
        self.progress.update_busy(label);
    }

    /// A cloneable handle that can relabel, but never clear, this guard.
    pub fn updater(&self) -> BusyUpdater {
        BusyUpdater {
            progress: self.progress.clone(),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.progress.clear_busy();
    }
}

/// Relabels an active busy indicator; obtained from [`BusyGuard::updater`].
#[derive(Clone)]
pub struct BusyUpdater {
    progress: Arc<dyn ProgressSurface>,
}

impl BusyUpdater {
    pub fn update(&self, label: &str) {
        self.progress.update_busy(label);
    }
}

/// Notifier and progress surface that only emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSignals;

impl Notifier for LogSignals {
    fn notify_success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn notify_error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

impl ProgressSurface for LogSignals {
    fn set_busy(&self, label: &str) {
        tracing::debug!(label, "busy");
    }

    fn update_busy(&self, label: &str) {
        tracing::trace!(label, "progress");
    }

    fn clear_busy(&self) {
        tracing::debug!("idle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingSignals, SignalEvent};

    #[test]
    fn guard_clears_on_drop() {
        let recorder = Arc::new(RecordingSignals::default());
        let signals = Signals::from_shared(recorder.clone());
        {
            let busy = signals.busy("Working");
            busy.update("Still working");
        }
        assert_eq!(
            recorder.events(),
            vec![
                SignalEvent::SetBusy("Working".into()),
                SignalEvent::UpdateBusy("Still working".into()),
                SignalEvent::ClearBusy,
            ]
        );
    }

    #[test]
    fn guard_clears_on_panic() {
        let recorder = Arc::new(RecordingSignals::default());
        let signals = Signals::from_shared(recorder.clone());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _busy = signals.busy("Doomed");
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(recorder.busy_set_count(), 1);
        assert_eq!(recorder.busy_clear_count(), 1);
    }
}
