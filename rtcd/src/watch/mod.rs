//! Progress watches: one background loop per watched category.

mod poll_loop;
mod source;

pub use poll_loop::ProgressPollLoop;
pub use source::FileWatch;

use std::time::Duration;

use rtc_common::config::PollingConfig;
use rtc_common::{HostId, PollState, WatchMode};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What woke a watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// Timer expiry (including the initial tick).
    Tick,
    /// The watched overview file changed.
    Changed,
}

/// Timing of a watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub mode: WatchMode,
    pub watch_interval: Duration,
    pub busy_interval: Duration,
    /// Fallback re-poll cadence while change notifications drive the loop.
    pub notify_fallback: Duration,
    pub settle_delay: Duration,
}

impl WatchSettings {
    pub fn from_config(polling: &PollingConfig) -> Self {
        Self {
            mode: polling.watch_mode,
            watch_interval: polling.watch_interval(),
            busy_interval: polling.busy_interval(),
            notify_fallback: polling.status_interval(),
            settle_delay: polling.settle_delay(),
        }
    }

    /// Delay until the next timer tick.
    pub fn cadence(&self, host_busy: bool) -> Duration {
        if host_busy {
            return self.busy_interval;
        }
        match self.mode {
            WatchMode::Interval => self.watch_interval,
            WatchMode::Notify => self.notify_fallback,
        }
    }
}

/// Handle to a running category watch.
///
/// Stopping is idempotent; dropping the handle stops the watch.
pub struct WatchHandle {
    host: HostId,
    category: String,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<PollState>>,
}

impl WatchHandle {
    pub fn host(&self) -> &HostId {
        &self.host
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to exit and return its final state.
    pub async fn join(mut self) -> Option<PollState> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
