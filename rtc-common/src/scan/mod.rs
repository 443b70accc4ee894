//! Fault overview scanning.
//!
//! A scan resolves the host's installed module/version/date from its system
//! log, lists the category directories below the version-scoped result
//! directory and parses every category's overview log into error blocks.
//! The result replaces the host's previous entry in the shared
//! [`CategoryErrorIndex`].

pub mod overview;
pub mod system_log;

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{Access, RemoteFileClient};
use crate::config::{PathVars, RtcConfig, join, render};
use crate::error::{ParseError, RemoteError, ScanError, TransientReadError};
use crate::retry::{RetryPolicy, run_with_retry};
use crate::transport::ShareTransport;
use crate::types::HostId;

pub use overview::{
    CategoryErrors, blocking_count, count_started, extract_last_test_case_number, parse_overview,
};
pub use system_log::{SystemVersion, find_version_tag, module_regex, parse_system_log};

/// Prefix shared by all category directory names.
pub const CATEGORY_PREFIX: &str = "Kategorie";

/// Everything a scan needs from the configuration.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub system_log: String,
    pub system_log_line: usize,
    pub version_base: String,
    pub overview_file: String,
    pub modules: Regex,
    pub error_patterns: Vec<String>,
    pub informational_pattern: String,
}

impl ScanSettings {
    pub fn from_config(config: &RtcConfig) -> Result<Self, ParseError> {
        Ok(Self {
            system_log: config.paths.system_log.clone(),
            system_log_line: config.scan.system_log_line,
            version_base: config.paths.version_base.clone(),
            overview_file: config.paths.overview_file.clone(),
            modules: module_regex(&config.scan.modules)?,
            error_patterns: config.scan.error_patterns.clone(),
            informational_pattern: config.scan.informational_pattern.clone(),
        })
    }
}

/// A category whose overview could not be read during a host scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Scan result for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostErrorIndex {
    pub version: SystemVersion,
    pub version_dir: String,
    pub categories: BTreeMap<String, CategoryErrors>,
    pub failures: Vec<CategoryFailure>,
}

impl HostErrorIndex {
    /// Blocks across all categories, excluding the informational pattern.
    pub fn blocking_count(&self, informational: &str) -> usize {
        self.categories
            .values()
            .map(|errors| blocking_count(errors, informational))
            .sum()
    }

    /// Number of blocks per pattern across all categories.
    pub fn pattern_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for errors in self.categories.values() {
            for (pattern, blocks) in errors {
                *counts.entry(pattern.clone()).or_default() += blocks.len();
            }
        }
        counts
    }
}

/// Per-host error index shared between the scanner and its readers.
#[derive(Debug, Clone, Default)]
pub struct CategoryErrorIndex {
    hosts: Arc<RwLock<BTreeMap<HostId, HostErrorIndex>>>,
}

impl CategoryErrorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the host's entry wholesale.
    pub async fn replace(&self, host: &HostId, entry: HostErrorIndex) {
        self.hosts.write().await.insert(host.clone(), entry);
    }

    pub async fn remove(&self, host: &HostId) -> Option<HostErrorIndex> {
        self.hosts.write().await.remove(host)
    }

    pub async fn get(&self, host: &HostId) -> Option<HostErrorIndex> {
        self.hosts.read().await.get(host).cloned()
    }

    pub async fn errors_for(&self, host: &HostId, category: &str) -> Option<CategoryErrors> {
        self.hosts
            .read()
            .await
            .get(host)
            .and_then(|entry| entry.categories.get(category).cloned())
    }

    pub async fn blocking_error_count(&self, host: &HostId, informational: &str) -> Option<usize> {
        self.hosts
            .read()
            .await
            .get(host)
            .map(|entry| entry.blocking_count(informational))
    }

    pub async fn hosts(&self) -> Vec<HostId> {
        self.hosts.read().await.keys().cloned().collect()
    }
}

/// Reads system and overview logs of a host and indexes their errors.
pub struct FaultOverviewScanner<T> {
    client: RemoteFileClient<T>,
    settings: Arc<ScanSettings>,
    index: CategoryErrorIndex,
}

impl<T> Clone for FaultOverviewScanner<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            settings: self.settings.clone(),
            index: self.index.clone(),
        }
    }
}

impl<T: ShareTransport> FaultOverviewScanner<T> {
    pub fn new(client: RemoteFileClient<T>, settings: ScanSettings, index: CategoryErrorIndex) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            index,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn index(&self) -> &CategoryErrorIndex {
        &self.index
    }

    pub fn client(&self) -> &RemoteFileClient<T> {
        &self.client
    }

    /// Module, version and date currently installed on `host`.
    pub async fn read_system_version(&self, host: &HostId) -> Result<SystemVersion, ScanError> {
        let path = render(&self.settings.system_log, &PathVars::host(host.as_str()));
        let file = self
            .client
            .with_policy(RetryPolicy::version_read())
            .read_text(Access::vm(host), &path)
            .await?;
        let version = parse_system_log(
            &file.text,
            self.settings.system_log_line,
            &self.settings.modules,
        )?;
        debug!(host = %host, module = %version.module, version = %version.version, "Resolved system version");
        Ok(version)
    }

    /// Result directory for the installed version.
    pub fn version_dir(&self, host: &HostId, version: &SystemVersion) -> String {
        render(
            &self.settings.version_base,
            &PathVars {
                host: Some(host.as_str()),
                module: Some(&version.module),
                version: Some(&version.version),
                date: Some(&version.date),
                category: None,
            },
        )
    }

    pub fn overview_path(&self, version_dir: &str, category: &str) -> String {
        join(&join(version_dir, category), &self.settings.overview_file)
    }

    /// Category directories below `version_dir`, sorted.
    pub async fn list_categories(
        &self,
        host: &HostId,
        version_dir: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let mut categories: Vec<String> = self
            .client
            .list_dirs(Access::vm(host), version_dir)
            .await?
            .into_iter()
            .filter(|name| name.starts_with(CATEGORY_PREFIX))
            .collect();
        categories.sort();
        Ok(categories)
    }

    /// Overview log text for a progress tick.
    ///
    /// Each attempt opens the file once; the log-scan envelope retries any
    /// failure other than an offline host or rejected credentials.
    pub async fn read_overview_text(&self, host: &HostId, path: &str) -> Result<String, RemoteError> {
        let client = &self.client.with_policy(RetryPolicy::once());
        let read = || async move {
            client
                .read_text(Access::vm(host), path)
                .await
                .map_err(TransientReadError::from)
        };
        match run_with_retry("overview read", &RetryPolicy::log_scan(), read).await {
            Ok(done) => Ok(done.value.text),
            Err(failed) => Err(failed.value.0),
        }
    }

    pub async fn scan_category(
        &self,
        host: &HostId,
        version_dir: &str,
        category: &str,
    ) -> Result<CategoryErrors, RemoteError> {
        let path = self.overview_path(version_dir, category);
        let file = self
            .client
            .with_policy(RetryPolicy::log_scan())
            .read_text(Access::vm(host), &path)
            .await?;
        Ok(parse_overview(&file.text, &self.settings.error_patterns))
    }

    /// Full scan of `host`; replaces its entry in the shared index.
    ///
    /// Unreadable categories are recorded in `failures` and skipped. If the
    /// system log or the category listing fails, the host's previous entry
    /// is dropped and the error returned.
    pub async fn read_overview(&self, host: &HostId) -> Result<HostErrorIndex, ScanError> {
        let prepared = async {
            let version = self.read_system_version(host).await?;
            let version_dir = self.version_dir(host, &version);
            let categories = self.list_categories(host, &version_dir).await?;
            Ok::<_, ScanError>((version, version_dir, categories))
        }
        .await;

        let (version, version_dir, categories) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                self.index.remove(host).await;
                warn!(host = %host, "Overview scan failed: {}", err);
                return Err(err);
            }
        };

        let mut entry = HostErrorIndex {
            version,
            version_dir,
            categories: BTreeMap::new(),
            failures: Vec::new(),
        };
        for category in categories {
            match self.scan_category(host, &entry.version_dir, &category).await {
                Ok(errors) => {
                    entry.categories.insert(category, errors);
                }
                Err(err) => {
                    warn!(host = %host, category = %category, "Skipping category: {}", err);
                    entry.failures.push(CategoryFailure {
                        category,
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            host = %host,
            categories = entry.categories.len(),
            failures = entry.failures.len(),
            blocking = entry.blocking_count(&self.settings.informational_pattern),
            "Overview scan complete"
        );
        self.index.replace(host, entry.clone()).await;
        Ok(entry)
    }
}
