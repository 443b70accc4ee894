//! Installed module/version/date from the host's system log.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Version tag families in priority order.
static VERSION_TAGS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"\\(LF[^\\]*)\\",
        r"\\(LT[^\\]*)\\",
        r"\\(LFREF[^\\]*)\\",
    ]
    .map(|pattern| Regex::new(pattern).expect("literal regex pattern"))
});

/// Module/version/date triple installed on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemVersion {
    pub module: String,
    pub version: String,
    /// `MM-YYYY`.
    pub date: String,
}

/// First tag of the highest-priority family present on the line.
///
/// `LF` captures that are really `LFREF` tags belong to the third family.
pub fn find_version_tag(line: &str) -> Option<&str> {
    let [lf, lt, lfref] = &*VERSION_TAGS;
    let plain_lf = lf
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .find(|m| !m.as_str().starts_with("LFREF"));

    plain_lf
        .or_else(|| lt.captures(line).and_then(|caps| caps.get(1)))
        .or_else(|| lfref.captures(line).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
}

/// Regex for `ergebnis\<module>\<MM-YYYY>\` restricted to known modules.
pub fn module_regex(modules: &[String]) -> Result<Regex, ParseError> {
    if modules.is_empty() {
        return Err(ParseError::InvalidValue {
            what: "module list",
            value: String::new(),
        });
    }
    let alternatives = modules
        .iter()
        .map(|m| regex::escape(m.trim()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"ergebnis\\({alternatives})\\(\d{{2}}-\d{{4}})\\")).map_err(|_| {
        ParseError::InvalidValue {
            what: "module list",
            value: modules.join(","),
        }
    })
}

/// Parse the version line (1-based `line_number`) of a system log.
pub fn parse_system_log(
    content: &str,
    line_number: usize,
    module_regex: &Regex,
) -> Result<SystemVersion, ParseError> {
    let line = line_number
        .checked_sub(1)
        .and_then(|idx| content.lines().nth(idx))
        .ok_or_else(|| ParseError::MissingLine {
            line: line_number,
            available: content.lines().count(),
        })?;

    let version = find_version_tag(line).ok_or_else(|| ParseError::NoVersionTag {
        line: line.to_string(),
    })?;
    let caps = module_regex
        .captures(line)
        .ok_or_else(|| ParseError::NoModuleSegment {
            line: line.to_string(),
        })?;

    Ok(SystemVersion {
        module: caps[1].trim().to_string(),
        version: version.to_string(),
        date: caps[2].to_string(),
    })
}
