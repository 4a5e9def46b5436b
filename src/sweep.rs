//! Periodic removal of expired profiles.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{cache::ProfileStore, config::DEFAULT_SWEEP_INTERVAL};

/// Handle to a running sweep task.
///
/// [`SweepHandle::shutdown`] stops the task gracefully; dropping the handle
/// aborts it.
#[derive(Debug)]
pub struct SweepHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Starts sweeping `store` every `period` on the current tokio runtime.
    ///
    /// The first sweep happens one full period after the call. A zero
    /// `period` is replaced by [`DEFAULT_SWEEP_INTERVAL`].
    pub(crate) fn spawn(store: Arc<dyn ProfileStore>, period: Duration) -> Self {
        let period = if period.is_zero() {
            tracing::warn!(
                default_secs = DEFAULT_SWEEP_INTERVAL.as_secs(),
                "Zero sweep interval configured, using default"
            );
            DEFAULT_SWEEP_INTERVAL
        } else {
            period
        };
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            tracing::info!(period_secs = period.as_secs(), "Profile cache sweeper started");

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let removed = store.remove_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = store.len(), "Swept expired profiles");
                        }
                    }
                }
            }

            tracing::info!("Profile cache sweeper stopped");
        });

        Self {
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Returns `true` once the sweep task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the sweep task and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Profile cache sweeper did not exit cleanly");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
