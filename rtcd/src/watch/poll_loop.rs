//! The per-category progress loop.
//!
//! A loop wakes on its timer or on a change notification, checks that the
//! host is free, runs one progress tick and hands the result to the sink
//! and the event bus. Wake-ups while the host is busy are deferred to the
//! next busy-interval re-check rather than dropped. The loop ends on a
//! terminal phase or when stopped.

use std::path::PathBuf;
use std::sync::Arc;

use rtc_common::{CountSource, PollPhase, PollState, ProgressTracker, ShareTransport, WatchMode};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use super::{FileWatch, PollEvent, WatchHandle, WatchSettings};
use crate::events::{EventBus, StopReason};
use crate::probe::BusyProbe;
use crate::sink::ProgressSink;

/// Spawns and drives progress watches.
pub struct ProgressPollLoop<T, C, B, S> {
    tracker: Arc<ProgressTracker<T, C>>,
    busy: Arc<B>,
    sink: Arc<S>,
    events: EventBus,
    settings: WatchSettings,
}

impl<T, C, B, S> Clone for ProgressPollLoop<T, C, B, S> {
    fn clone(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            busy: self.busy.clone(),
            sink: self.sink.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<T, C, B, S> ProgressPollLoop<T, C, B, S>
where
    T: ShareTransport + 'static,
    C: CountSource + 'static,
    B: BusyProbe + 'static,
    S: ProgressSink + 'static,
{
    pub fn new(
        tracker: Arc<ProgressTracker<T, C>>,
        busy: Arc<B>,
        sink: Arc<S>,
        events: EventBus,
        settings: WatchSettings,
    ) -> Self {
        Self {
            tracker,
            busy,
            sink,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// Start watching `state`'s category.
    ///
    /// In notify mode `watch_path` is the local path of the overview file;
    /// if the watch cannot be set up the loop runs on its timer alone.
    pub fn spawn(&self, state: PollState, watch_path: Option<PathBuf>) -> WatchHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let host = state.host.clone();
        let category = state.category.clone();

        let mut changes = None;
        let mut file_watch = None;
        if self.settings.mode == WatchMode::Notify
            && let Some(path) = watch_path
        {
            let (tx, rx) = mpsc::channel(1);
            match FileWatch::start(&path, tx) {
                Ok(watch) => {
                    file_watch = Some(watch);
                    changes = Some(rx);
                }
                Err(err) => {
                    warn!(host = %host, category = %category, "Change notification unavailable, polling only: {:#}", err)
                }
            }
        }

        let runner = self.clone();
        let task = tokio::spawn(async move {
            let state = runner.run(state, stop_rx, changes).await;
            drop(file_watch);
            state
        });

        WatchHandle {
            host,
            category,
            stop: stop_tx,
            task: Some(task),
        }
    }

    async fn run(
        &self,
        mut state: PollState,
        mut stop: watch::Receiver<bool>,
        mut changes: Option<mpsc::Receiver<()>>,
    ) -> PollState {
        info!(host = %state.host, category = %state.category, mode = ?self.settings.mode, "Progress watch started");

        let mut deadline = Instant::now();
        let reason = loop {
            if *stop.borrow() {
                break StopReason::Stopped;
            }

            let event = tokio::select! {
                biased;
                _ = stop.changed() => break StopReason::Stopped,
                Some(()) = next_change(&mut changes) => PollEvent::Changed,
                _ = sleep_until(deadline) => PollEvent::Tick,
            };

            if event == PollEvent::Changed {
                sleep(self.settings.settle_delay).await;
            }

            if !self.busy.is_free(&state.host).await {
                debug!(host = %state.host, category = %state.category, ?event, "Host busy, deferring");
                deadline = Instant::now() + self.settings.cadence(true);
                continue;
            }

            let progress = self.tracker.tick(&mut state).await;
            if let Err(err) = self.sink.publish(&progress).await {
                warn!(host = %state.host, category = %state.category, "Failed to publish progress: {:#}", err);
            }
            self.events.progress(&progress);

            match state.phase {
                PollPhase::Completed => break StopReason::Completed,
                PollPhase::Errored => break StopReason::Errored,
                PollPhase::Watching => {}
            }
            deadline = Instant::now() + self.settings.cadence(false);
        };

        info!(host = %state.host, category = %state.category, ?reason, "Progress watch ended");
        self.events
            .watch_stopped(&state.host, &state.category, reason);
        state
    }
}

async fn next_change(changes: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
