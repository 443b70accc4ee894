//! Environment variable overrides.
//!
//! Collects every parse error so a misconfigured environment is reported in
//! one go instead of one variable per restart.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Prefixed environment parser.
///
/// The lookup is injectable so tests never touch the process environment.
#[derive(Clone)]
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvParser")
            .field("prefix", &self.prefix)
            .field("errors", &self.errors)
            .finish()
    }
}

impl EnvParser {
    /// Parser over the process environment with the `RTC_` prefix.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Parser over an arbitrary lookup function.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            prefix: "RTC_",
            lookup: Arc::new(lookup),
            errors: Vec::new(),
        }
    }

    /// Parser over fixed `(name, value)` pairs; names include the prefix.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::with_lookup(move |name| {
            owned
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, var_name: &str) -> Option<String> {
        (self.lookup)(var_name)
    }

    /// Non-empty string value.
    pub fn get_string(&mut self, name: &str) -> Option<String> {
        self.raw(&self.var_name(name)).filter(|v| !v.is_empty())
    }

    /// Secret value (passwords). Never logged, never echoed in errors.
    pub fn get_secret(&mut self, name: &str) -> Option<String> {
        self.raw(&self.var_name(name))
    }

    /// Boolean value.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let var_name = self.var_name(name);
        let value = self.raw(&var_name)?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// u64 value within `min..=max`.
    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let var_name = self.var_name(name);
        let value = self.raw(&var_name)?;
        match value.trim().parse::<u64>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Comma-separated list; empty entries are dropped.
    pub fn get_list(&mut self, name: &str) -> Option<Vec<String>> {
        let value = self.get_string(name)?;
        Some(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// One of `allowed` (case-insensitive), returned lowercased.
    pub fn get_choice(&mut self, name: &str, allowed: &[&str]) -> Option<String> {
        let var_name = self.var_name(name);
        let value = self.raw(&var_name)?;
        let lowered = value.to_lowercase();
        if allowed.contains(&lowered.as_str()) {
            Some(lowered)
        } else {
            self.errors.push(EnvError::InvalidValue {
                var: var_name,
                expected: allowed.join("|"),
                value,
            });
            None
        }
    }

    /// Log level filter (trace/debug/info/warn/error/off).
    pub fn get_log_level(&mut self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        let value = self.raw(&var_name)?;
        let lowered = value.to_lowercase();
        if is_log_level(&lowered) {
            Some(lowered)
        } else {
            self.errors.push(EnvError::InvalidLogLevel {
                var: var_name,
                value,
            });
            None
        }
    }
}

pub(crate) fn is_log_level(value: &str) -> bool {
    matches!(value, "trace" | "debug" | "info" | "warn" | "error" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_vars_yield_none_without_errors() {
        let mut parser = EnvParser::from_pairs(&[]);
        assert_eq!(parser.get_string("LOG_LEVEL"), None);
        assert_eq!(parser.get_bool("WATCH"), None);
        assert_eq!(parser.get_u64_range("STATUS_INTERVAL_SECS", 1, 3600), None);
        assert!(!parser.has_errors());
    }

    #[test]
    fn test_get_bool_variants() {
        let mut parser = EnvParser::from_pairs(&[("RTC_A", "yes"), ("RTC_B", "off")]);
        assert_eq!(parser.get_bool("A"), Some(true));
        assert_eq!(parser.get_bool("B"), Some(false));
    }

    #[test]
    fn test_invalid_values_are_collected() {
        let mut parser = EnvParser::from_pairs(&[
            ("RTC_FLAG", "maybe"),
            ("RTC_SECS", "abc"),
            ("RTC_RANGE", "0"),
            ("RTC_LOG_LEVEL", "loud"),
        ]);
        assert_eq!(parser.get_bool("FLAG"), None);
        assert_eq!(parser.get_u64_range("SECS", 1, 60), None);
        assert_eq!(parser.get_u64_range("RANGE", 1, 60), None);
        assert_eq!(parser.get_log_level("LOG_LEVEL"), None);

        let errors = parser.take_errors();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[2], EnvError::OutOfRange { .. }));
        assert!(matches!(errors[3], EnvError::InvalidLogLevel { .. }));
        assert!(!parser.has_errors());
    }

    #[test]
    fn test_get_list_trims_entries() {
        let mut parser = EnvParser::from_pairs(&[("RTC_MODULES", " Basis, Export ,,")]);
        assert_eq!(
            parser.get_list("MODULES"),
            Some(vec!["Basis".to_string(), "Export".to_string()])
        );
    }

    #[test]
    fn test_get_choice_is_case_insensitive() {
        let mut parser = EnvParser::from_pairs(&[("RTC_WATCH_MODE", "Notify")]);
        assert_eq!(
            parser.get_choice("WATCH_MODE", &["interval", "notify"]),
            Some("notify".to_string())
        );
    }

    #[test]
    fn test_secret_is_not_in_debug_output() {
        let mut parser = EnvParser::from_pairs(&[("RTC_VM_PASSWORD", "hunter2")]);
        assert_eq!(parser.get_secret("VM_PASSWORD").as_deref(), Some("hunter2"));
        assert!(!format!("{parser:?}").contains("hunter2"));
    }
}
