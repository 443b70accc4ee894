//! Progress sinks: where computed progress goes after every tick.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rtc_common::{CategoryErrorIndex, CategoryProgress, HostId};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Consumer of per-tick category progress.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, progress: &CategoryProgress) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Report document written per host.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: HostId,
    pub updated_at: Option<DateTime<Utc>>,
    pub categories: BTreeMap<String, CategoryProgress>,
    /// Error blocks per pattern from the most recent overview scan.
    pub error_counts: BTreeMap<String, usize>,
    pub blocking_errors: usize,
}

impl HostReport {
    fn new(host: HostId) -> Self {
        Self {
            host,
            updated_at: None,
            categories: BTreeMap::new(),
            error_counts: BTreeMap::new(),
            blocking_errors: 0,
        }
    }
}

/// Writes `<dir>/<host>.json` with the latest progress of every category
/// and the host's current error summary.
pub struct JsonReportSink {
    dir: PathBuf,
    errors: CategoryErrorIndex,
    informational: String,
    reports: Mutex<BTreeMap<HostId, HostReport>>,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>, errors: CategoryErrorIndex, informational: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            errors,
            informational: informational.into(),
            reports: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn report_path(&self, host: &HostId) -> PathBuf {
        self.dir.join(format!("{host}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ProgressSink for JsonReportSink {
    async fn publish(&self, progress: &CategoryProgress) -> anyhow::Result<()> {
        let host = &progress.host;
        let entry = self.errors.get(host).await;

        let mut reports = self.reports.lock().await;
        let report = reports.entry(host.clone()).or_insert_with(|| HostReport::new(host.clone()));
        report.updated_at = Some(progress.observed_at);
        report
            .categories
            .insert(progress.category.clone(), progress.clone());
        if let Some(entry) = entry {
            report.error_counts = entry.pattern_counts();
            report.blocking_errors = entry.blocking_count(&self.informational);
        }
        let json = serde_json::to_string_pretty(&*report)?;
        drop(reports);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create report directory {}", self.dir.display()))?;
        let path = self.report_path(host);
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        debug!(host = %host, category = %progress.category, path = %path.display(), "Report written");
        Ok(())
    }
}
