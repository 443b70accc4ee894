//! Configuration for RTC.
//!
//! Layering, lowest to highest precedence:
//! - built-in defaults
//! - TOML file (`<config_dir>/rtc/config.toml` or `--config`)
//! - `RTC_*` environment variables
//!
//! Passwords are only taken from `RTC_NETWORK_PASSWORD` / `RTC_VM_PASSWORD`.

pub mod env;
pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::{CredentialSet, Credentials, HostId};

pub use env::{EnvError, EnvParser};
pub use paths::{PathVars, join, render};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid environment overrides: {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Sections ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Account names per network role. Passwords never live in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub network_username: String,
    pub vm_username: String,
}

/// Share path templates.
///
/// Placeholders: `{host}`, `{module}`, `{version}`, `{date}`, `{category}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Per-host system log holding the installed version on a fixed line.
    pub system_log: String,
    /// Shared 4-line controlling file.
    pub controlling_file: String,
    /// Directory holding one `<host>work.txt` busy flag per host.
    pub busy_status_dir: String,
    /// Version-scoped result directory containing one folder per category.
    pub version_base: String,
    /// Directory with one test-source folder per module.
    pub test_source_dir: String,
    /// Category declaration file inside a module's test-source folder.
    pub declaration_file: String,
    /// Path whose existence means tests are currently running on the host.
    pub activity_marker: String,
    /// Local directory of per-module JSON documents with expected counts.
    pub count_dir: PathBuf,
    /// Overview log file name inside each category folder.
    pub overview_file: String,
    /// Local directory for JSON progress reports.
    pub report_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            system_log: r"\\{host}\c$\Testsystem\Log\system.log".to_string(),
            controlling_file: r"\\fileserver\regression\controlling.txt".to_string(),
            busy_status_dir: r"\\fileserver\regression\timecontrol".to_string(),
            version_base: r"\\fileserver\ergebnis\{module}\{date}\{version}\{host}".to_string(),
            test_source_dir: r"\\fileserver\regression\source".to_string(),
            declaration_file: "Test".to_string(),
            activity_marker: r"\\{host}\c$\Testsystem\aktiv".to_string(),
            count_dir: PathBuf::from("resources/counts"),
            overview_file: "uebersicht.txt".to_string(),
            report_dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Module names recognised in the system log's result path.
    pub modules: Vec<String>,
    /// Ordered error markers searched for in overview logs.
    pub error_patterns: Vec<String>,
    /// Marker that does not count as a blocking error.
    pub informational_pattern: String,
    /// 1-based line of the system log carrying version and module.
    pub system_log_line: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            error_patterns: [".*.", ".+.", ".F.", ".H."]
                .into_iter()
                .map(String::from)
                .collect(),
            informational_pattern: ".H.".to_string(),
            system_log_line: 8,
        }
    }
}

/// How progress watches are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Fixed-interval re-poll only.
    #[default]
    Interval,
    /// Interval re-poll plus filesystem change notification.
    Notify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub status_interval_secs: u64,
    pub watch_interval_secs: u64,
    pub busy_interval_secs: u64,
    pub settle_delay_secs: u64,
    pub watch_mode: WatchMode,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 10,
            watch_interval_secs: 2,
            busy_interval_secs: 5,
            settle_delay_secs: 1,
            watch_mode: WatchMode::Interval,
        }
    }
}

impl PollingConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    pub fn busy_interval(&self) -> Duration {
        Duration::from_secs(self.busy_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostsConfig {
    pub tracked: Vec<HostId>,
}

// ── Root ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    pub general: GeneralConfig,
    pub share: ShareConfig,
    pub paths: PathsConfig,
    pub scan: ScanConfig,
    pub polling: PollingConfig,
    pub hosts: HostsConfig,
}

impl RtcConfig {
    /// `<config_dir>/rtc/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rtc").join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load file (explicit path must exist; default path is optional),
    /// apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>, env: &mut EnvParser) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RTC_*` overrides; all invalid values are reported together.
    pub fn apply_env(&mut self, env: &mut EnvParser) -> Result<(), ConfigError> {
        if let Some(level) = env.get_log_level("LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(user) = env.get_string("NETWORK_USERNAME") {
            self.share.network_username = user;
        }
        if let Some(user) = env.get_string("VM_USERNAME") {
            self.share.vm_username = user;
        }
        if let Some(modules) = env.get_list("MODULES") {
            self.scan.modules = modules;
        }
        if let Some(patterns) = env.get_list("ERROR_PATTERNS") {
            self.scan.error_patterns = patterns;
        }
        if let Some(hosts) = env.get_list("HOSTS") {
            self.hosts.tracked = hosts.into_iter().map(HostId::new).collect();
        }
        if let Some(path) = env.get_string("CONTROLLING_PATH") {
            self.paths.controlling_file = path;
        }
        if let Some(path) = env.get_string("REPORT_DIR") {
            self.paths.report_dir = PathBuf::from(path);
        }
        if let Some(secs) = env.get_u64_range("STATUS_INTERVAL_SECS", 1, 3600) {
            self.polling.status_interval_secs = secs;
        }
        if let Some(secs) = env.get_u64_range("WATCH_INTERVAL_SECS", 1, 3600) {
            self.polling.watch_interval_secs = secs;
        }
        if let Some(secs) = env.get_u64_range("BUSY_INTERVAL_SECS", 1, 3600) {
            self.polling.busy_interval_secs = secs;
        }
        if let Some(mode) = env.get_choice("WATCH_MODE", &["interval", "notify"]) {
            self.polling.watch_mode = if mode == "notify" {
                WatchMode::Notify
            } else {
                WatchMode::Interval
            };
        }

        let errors = env.take_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Env(errors))
        }
    }

    /// Report every invalid combination at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if !env::is_log_level(&self.general.log_level.to_lowercase()) {
            problems.push(format!("unknown log level '{}'", self.general.log_level));
        }
        if self.scan.modules.is_empty() {
            problems.push("scan.modules must name at least one module".to_string());
        }
        if self.scan.error_patterns.is_empty() {
            problems.push("scan.error_patterns must not be empty".to_string());
        }
        if !self.scan.informational_pattern.is_empty()
            && !self
                .scan
                .error_patterns
                .contains(&self.scan.informational_pattern)
        {
            problems.push(format!(
                "scan.informational_pattern '{}' is not in scan.error_patterns",
                self.scan.informational_pattern
            ));
        }
        if self.scan.system_log_line == 0 {
            problems.push("scan.system_log_line is 1-based and must be > 0".to_string());
        }
        for (name, secs) in [
            ("status_interval_secs", self.polling.status_interval_secs),
            ("watch_interval_secs", self.polling.watch_interval_secs),
            ("busy_interval_secs", self.polling.busy_interval_secs),
        ] {
            if secs == 0 {
                problems.push(format!("polling.{name} must be > 0"));
            }
        }
        if self.paths.overview_file.is_empty() {
            problems.push("paths.overview_file must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Credentials per role: usernames from config, passwords from the
    /// environment only.
    pub fn credentials(&self, env: &mut EnvParser) -> CredentialSet {
        CredentialSet {
            network: Credentials::new(
                self.share.network_username.clone(),
                env.get_secret("NETWORK_PASSWORD").unwrap_or_default(),
            ),
            vm: Credentials::new(
                self.share.vm_username.clone(),
                env.get_secret("VM_PASSWORD").unwrap_or_default(),
            ),
        }
    }

    /// Example configuration with all defaults.
    pub fn sample_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> RtcConfig {
        let mut config = RtcConfig::default();
        config.scan.modules = vec!["Basis".to_string()];
        config
    }

    #[test]
    fn test_defaults() {
        let config = RtcConfig::default();
        assert_eq!(config.polling.status_interval(), Duration::from_secs(10));
        assert_eq!(config.polling.watch_interval(), Duration::from_secs(2));
        assert_eq!(config.polling.busy_interval(), Duration::from_secs(5));
        assert_eq!(config.scan.system_log_line, 8);
        assert_eq!(config.scan.error_patterns.len(), 4);
        assert_eq!(config.paths.overview_file, "uebersicht.txt");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [scan]
            modules = ["Basis", "Export"]

            [polling]
            watch_mode = "notify"

            [hosts]
            tracked = ["masch1", "masch2"]
        "#;
        let config = RtcConfig::from_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.scan.modules, vec!["Basis", "Export"]);
        assert_eq!(config.polling.watch_mode, WatchMode::Notify);
        assert_eq!(config.polling.status_interval_secs, 10);
        assert_eq!(config.hosts.tracked[1], HostId::new("masch2"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = RtcConfig::from_toml("[scan\nmodules=", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = TempDir::new().unwrap();
        let err = RtcConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_explicit_file_with_env_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\nmodules = [\"Basis\"]\n").unwrap();

        let mut env = EnvParser::from_pairs(&[
            ("RTC_STATUS_INTERVAL_SECS", "30"),
            ("RTC_HOSTS", "masch1,masch3"),
            ("RTC_LOG_LEVEL", "DEBUG"),
        ]);
        let config = RtcConfig::load(Some(&path), &mut env).unwrap();
        assert_eq!(config.polling.status_interval_secs, 30);
        assert_eq!(config.hosts.tracked.len(), 2);
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_env_errors_are_reported_together() {
        let mut config = valid();
        let mut env = EnvParser::from_pairs(&[
            ("RTC_STATUS_INTERVAL_SECS", "0"),
            ("RTC_WATCH_MODE", "sometimes"),
        ]);
        match config.apply_env(&mut env) {
            Err(ConfigError::Env(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected env errors, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_collects_problems() {
        let mut config = RtcConfig::default();
        config.scan.error_patterns.clear();
        config.polling.watch_interval_secs = 0;

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => {
                // modules, patterns, informational, interval
                assert_eq!(problems.len(), 4);
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_credentials_take_passwords_from_env() {
        let mut config = valid();
        config.share.network_username = "netuser".to_string();
        config.share.vm_username = "vmuser".to_string();
        let mut env = EnvParser::from_pairs(&[("RTC_VM_PASSWORD", "vm-secret")]);

        let creds = config.credentials(&mut env);
        assert_eq!(creds.vm.password, "vm-secret");
        assert_eq!(creds.network.username, "netuser");
        assert_eq!(creds.network.password, "");
    }

    #[test]
    fn test_sample_toml_round_trips() {
        let sample = RtcConfig::sample_toml();
        let parsed = RtcConfig::from_toml(&sample, Path::new("sample.toml")).unwrap();
        assert_eq!(parsed, RtcConfig::default());
    }
}
