//! Overview log parsing.
//!
//! ```text
//! Start TF: Anlage_Kunde (3 von 10)
//!   .F. Feld Name leer
//!   .H. Hinweis: Dialog geschlossen
//! Ende  TF: Anlage_Kunde
//! ```
//!
//! Every test case between a start and an end marker becomes one block per
//! error pattern whose marker appears in at least one of its lines.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Marker opening a test case.
pub const START_MARKER: &str = "Start TF";

/// Line break appended to every block line (blocks feed an HTML dashboard).
pub const LINE_BREAK: &str = "<br>";

static END_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Ende\s+TF").expect("literal regex pattern"));

static PROGRESS_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+) von (\d+)\)").expect("literal regex pattern"));

/// Error blocks of one category, keyed by error pattern.
///
/// Patterns without any block are absent.
pub type CategoryErrors = BTreeMap<String, Vec<String>>;

pub fn is_start_marker(line: &str) -> bool {
    line.starts_with(START_MARKER)
}

pub fn is_end_marker(line: &str) -> bool {
    END_MARKER.is_match(line)
}

/// Segment an overview log into error blocks per pattern.
pub fn parse_overview(content: &str, patterns: &[String]) -> CategoryErrors {
    let mut index = CategoryErrors::new();
    let mut header: Option<String> = None;
    let mut pending: Vec<String> = vec![String::new(); patterns.len()];

    for line in content.lines() {
        if is_start_marker(line) {
            header = Some(format!("{}{LINE_BREAK}", line.trim()));
            pending.iter_mut().for_each(String::clear);
        } else if is_end_marker(line) {
            if let Some(header) = header.take() {
                for (pattern, buffer) in patterns.iter().zip(&pending) {
                    if !buffer.is_empty() {
                        index
                            .entry(pattern.clone())
                            .or_default()
                            .push(format!("{header}{buffer}"));
                    }
                }
            }
            pending.iter_mut().for_each(String::clear);
        } else if header.is_some() {
            for (pattern, buffer) in patterns.iter().zip(pending.iter_mut()) {
                if line.contains(pattern.as_str()) {
                    buffer.push_str(line.trim());
                    buffer.push_str(LINE_BREAK);
                }
            }
        }
    }

    index
}

/// Number of blocks across all patterns except `informational`.
pub fn blocking_count(errors: &CategoryErrors, informational: &str) -> usize {
    errors
        .iter()
        .filter(|(pattern, _)| pattern.as_str() != informational)
        .map(|(_, blocks)| blocks.len())
        .sum()
}

/// Highest `X` of `Start TF: ... (X von <expected>)` lines; 0 if none.
///
/// Only counts bound to exactly `expected` are considered, so unrelated
/// numbers in parentheses never match.
pub fn extract_last_test_case_number(content: &str, expected: u32) -> u32 {
    content
        .lines()
        .filter_map(|line| line.find("Start TF:").map(|at| &line[at..]))
        .flat_map(|tail| PROGRESS_COUNT.captures_iter(tail))
        .filter(|caps| caps[2].parse::<u32>().ok() == Some(expected))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

/// Number of test cases started so far (`Start TF` lines).
pub fn count_started(content: &str) -> usize {
    content.lines().filter(|line| is_start_marker(line)).count()
}
