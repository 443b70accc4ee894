//! Per-category progress evaluation.
//!
//! One poll tick resolves the installed version, asks the [`CountSource`]
//! for the expected test-case count, reads the category's overview log and
//! folds the result into the category's [`PollState`]:
//!
//! | expected | current          | phase     | status      |
//! |----------|------------------|-----------|-------------|
//! | 0        | any              | Errored   | CountUnknown|
//! | > 0      | 0                | Watching  | NotStarted  |
//! | > 0      | 0 < c < expected | Watching  | InProgress  |
//! | > 0      | expected         | Completed | Completed   |
//!
//! A read failure that survives the log-scan retry envelope keeps the
//! category Watching with status `ReadFailed`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::counts::CountSource;
use crate::scan::{FaultOverviewScanner, extract_last_test_case_number};
use crate::transport::ShareTransport;
use crate::types::HostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Watching,
    /// Terminal: the last expected test case has started.
    Completed,
    /// Terminal: the category cannot be tracked (expected count unknown).
    Errored,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Watching)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
    CountUnknown,
    ReadFailed,
}

/// Outcome of comparing a current against an expected count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub phase: PollPhase,
    pub status: ProgressStatus,
    pub percent: u32,
}

/// Completion percentage, rounded to the nearest integer.
pub fn percent(current: u32, expected: u32) -> u32 {
    if expected == 0 {
        return 0;
    }
    let ratio = f64::from(current.min(expected)) / f64::from(expected);
    (ratio * 100.0).round() as u32
}

/// Completed only when the current count equals the expected count.
pub fn evaluate(expected: u32, current: u32) -> Evaluation {
    let (phase, status) = if expected == 0 {
        (PollPhase::Errored, ProgressStatus::CountUnknown)
    } else if current == expected {
        (PollPhase::Completed, ProgressStatus::Completed)
    } else if current == 0 {
        (PollPhase::Watching, ProgressStatus::NotStarted)
    } else {
        (PollPhase::Watching, ProgressStatus::InProgress)
    };
    Evaluation {
        phase,
        status,
        percent: percent(current, expected),
    }
}

/// Poll state of one (host, category).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollState {
    pub host: HostId,
    pub category: String,
    pub expected: u32,
    /// Highest index seen so far; never decreases.
    pub last_observed: u32,
    pub percent: u32,
    pub phase: PollPhase,
}

impl PollState {
    pub fn new(host: HostId, category: impl Into<String>) -> Self {
        Self {
            host,
            category: category.into(),
            expected: 0,
            last_observed: 0,
            percent: 0,
            phase: PollPhase::Watching,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn completed(&self) -> bool {
        self.phase == PollPhase::Completed
    }

    /// Fold one observation in. Terminal states are never left.
    pub fn observe(&mut self, expected: u32, current: u32) -> Evaluation {
        if self.is_terminal() {
            return Evaluation {
                phase: self.phase,
                status: match self.phase {
                    PollPhase::Completed => ProgressStatus::Completed,
                    _ => ProgressStatus::CountUnknown,
                },
                percent: self.percent,
            };
        }
        self.expected = expected;
        self.last_observed = self.last_observed.max(current);
        let evaluation = evaluate(expected, self.last_observed);
        self.percent = evaluation.percent;
        self.phase = evaluation.phase;
        evaluation
    }
}

/// Progress of one category after a tick, as handed to sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProgress {
    pub host: HostId,
    pub category: String,
    pub module: Option<String>,
    pub phase: PollPhase,
    pub status: ProgressStatus,
    pub percent: u32,
    pub current: u32,
    pub expected: u32,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl CategoryProgress {
    fn new(state: &PollState, module: Option<String>, status: ProgressStatus, message: String) -> Self {
        Self {
            host: state.host.clone(),
            category: state.category.clone(),
            module,
            phase: state.phase,
            status,
            percent: state.percent,
            current: state.last_observed,
            expected: state.expected,
            message,
            observed_at: Utc::now(),
        }
    }
}

/// Runs single poll ticks for categories of any host.
pub struct ProgressTracker<T, C> {
    scanner: FaultOverviewScanner<T>,
    counts: C,
}

impl<T: ShareTransport, C: CountSource> ProgressTracker<T, C> {
    pub fn new(scanner: FaultOverviewScanner<T>, counts: C) -> Self {
        Self { scanner, counts }
    }

    pub fn scanner(&self) -> &FaultOverviewScanner<T> {
        &self.scanner
    }

    /// Evaluate one tick for `state`'s category.
    pub async fn tick(&self, state: &mut PollState) -> CategoryProgress {
        let host = state.host.clone();
        let category = state.category.clone();

        if state.is_terminal() {
            let evaluation = state.observe(state.expected, state.last_observed);
            return CategoryProgress::new(state, None, evaluation.status, "already finished".into());
        }

        let version = match self.scanner.read_system_version(&host).await {
            Ok(version) => version,
            Err(err) => {
                warn!(host = %host, category = %category, "Cannot resolve version: {}", err);
                return CategoryProgress::new(state, None, ProgressStatus::ReadFailed, err.to_string());
            }
        };
        let module = Some(version.module.clone());

        let expected = self.counts.expected_count(&version.module, &category).await;
        if expected == 0 {
            state.observe(0, 0);
            warn!(host = %host, category = %category, module = %version.module, "Expected test case count unknown");
            return CategoryProgress::new(
                state,
                module,
                ProgressStatus::CountUnknown,
                format!("expected test case count for {category} could not be read"),
            );
        }

        let version_dir = self.scanner.version_dir(&host, &version);
        let path = self.scanner.overview_path(&version_dir, &category);
        let text = match self.scanner.read_overview_text(&host, &path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(host = %host, category = %category, "Overview unreadable: {}", err);
                state.expected = expected;
                return CategoryProgress::new(state, module, ProgressStatus::ReadFailed, err.to_string());
            }
        };

        let current = extract_last_test_case_number(&text, expected);
        let evaluation = state.observe(expected, current);
        let message = match evaluation.status {
            ProgressStatus::NotStarted => "not yet started".to_string(),
            ProgressStatus::Completed => format!("all {expected} test cases started"),
            _ => format!("{} of {expected} test cases started", state.last_observed),
        };

        if evaluation.phase == PollPhase::Completed {
            info!(host = %host, category = %category, expected, "Category completed");
        } else {
            debug!(host = %host, category = %category, current = state.last_observed, expected, percent = evaluation.percent, "Progress");
        }
        CategoryProgress::new(state, module, evaluation.status, message)
    }
}
