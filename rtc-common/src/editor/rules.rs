//! One named rule per editable field.
//!
//! Each rule decides whether a line is one of its targets and, if so,
//! rewrites only the value span(s) inside it. Spacing, quoting and anything
//! else on the line are left alone.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::EditError;

use super::ConfigField;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("literal regex pattern")
}

static PREFIX_VALUE: LazyLock<Regex> = LazyLock::new(|| regex(r#"praefix\s*=\s*"([^"]*)""#));
static BUILD_VALUE: LazyLock<Regex> = LazyLock::new(|| regex(r#"\bbuild\s*=\s*"([^"]*)""#));
static DATE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| regex(r"vbdatum\s*=\s*"));
pub(super) static DATE_VALUE: LazyLock<Regex> = LazyLock::new(|| regex(r"(\d{2})\.(\d{2})\.(\d{4})"));
static COLLECTION_ANCHOR: LazyLock<Regex> = LazyLock::new(|| regex(r"testsammlung\s*="));
static DATABASE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| regex(r"TestDB\s*="));
/// `\MM` or `\MM-YYYY` as a whole path segment.
static MONTH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| regex(r#"\\(\d{2})(?:-(\d{4}))?(?:[\\"'\s]|$)"#));
static DATABASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| regex(r#"(\d{4}|\d{2})(\d{2})"?\.mdb"#));
static CATEGORY_ANCHOR: LazyLock<Regex> = LazyLock::new(|| regex(r"Kategorie:"));
static CATEGORY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| regex(r#"Kategorie:?\s*=\s*"([^"]*)""#));

/// A line-level edit rule for one field.
pub trait LineRule: Send + Sync {
    fn field(&self) -> ConfigField;

    /// Check the replacement value before any line is touched.
    fn validate(&self, value: &str) -> Result<(), EditError>;

    /// Rewritten body if the line is a target of this rule, `None` otherwise.
    fn rewrite(&self, line_number: usize, body: &str, value: &str)
    -> Result<Option<String>, EditError>;

    /// Value currently held by the line, if it is a target.
    fn current(&self, body: &str) -> Option<String>;
}

/// The rule responsible for `field`.
pub fn rule_for(field: ConfigField) -> &'static dyn LineRule {
    match field {
        ConfigField::Prefix => &PrefixRule,
        ConfigField::Build => &BuildRule,
        ConfigField::Day => &DayRule,
        ConfigField::Month => &MonthRule,
        ConfigField::Year => &YearRule,
        ConfigField::Category => &CategoryRule,
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Replace non-overlapping byte ranges; later ranges that overlap an earlier
/// one are dropped.
fn splice(body: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&body[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&body[cursor..]);
    out
}

fn digits(field: &'static str, value: &str, width: usize) -> Result<(), EditError> {
    if value.len() == width && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(EditError::InvalidValue {
            field,
            value: value.to_string(),
            expected: match width {
                2 => "two digits",
                _ => "four digits",
            },
        })
    }
}

fn quotable(field: &'static str, value: &str) -> Result<(), EditError> {
    if value.contains(['"', '\r', '\n']) {
        Err(EditError::InvalidValue {
            field,
            value: value.to_string(),
            expected: "text without quotes or line breaks",
        })
    } else {
        Ok(())
    }
}

/// Date component range (1 = day, 2 = month, 3 = year) on a `vbdatum` line.
fn date_component(body: &str, group: usize) -> Option<Range<usize>> {
    let anchor = DATE_ANCHOR.find(body)?;
    let caps = DATE_VALUE.captures_at(body, anchor.end())?;
    caps.get(group).map(|m| m.range())
}

fn quoted_value(re: &Regex, body: &str) -> Option<Range<usize>> {
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
}

fn is_path_line(body: &str) -> bool {
    COLLECTION_ANCHOR.is_match(body) || DATABASE_ANCHOR.is_match(body)
}

// ── Rules ──────────────────────────────────────────────────────────────

/// `praefix = "<value>"`.
#[derive(Debug, Clone, Copy)]
pub struct PrefixRule;

impl LineRule for PrefixRule {
    fn field(&self) -> ConfigField {
        ConfigField::Prefix
    }

    fn validate(&self, value: &str) -> Result<(), EditError> {
        quotable("prefix", value)
    }

    fn rewrite(
        &self,
        _line_number: usize,
        body: &str,
        value: &str,
    ) -> Result<Option<String>, EditError> {
        Ok(quoted_value(&PREFIX_VALUE, body).map(|range| splice(body, vec![(range, value.into())])))
    }

    fn current(&self, body: &str) -> Option<String> {
        quoted_value(&PREFIX_VALUE, body).map(|range| body[range].to_string())
    }
}

/// `build = "<value>"`.
#[derive(Debug, Clone, Copy)]
pub struct BuildRule;

impl LineRule for BuildRule {
    fn field(&self) -> ConfigField {
        ConfigField::Build
    }

    fn validate(&self, value: &str) -> Result<(), EditError> {
        quotable("build", value)
    }

    fn rewrite(
        &self,
        _line_number: usize,
        body: &str,
        value: &str,
    ) -> Result<Option<String>, EditError> {
        Ok(quoted_value(&BUILD_VALUE, body).map(|range| splice(body, vec![(range, value.into())])))
    }

    fn current(&self, body: &str) -> Option<String> {
        quoted_value(&BUILD_VALUE, body).map(|range| body[range].to_string())
    }
}

/// `DD` of `vbdatum = DD.MM.YYYY`.
#[derive(Debug, Clone, Copy)]
pub struct DayRule;

impl LineRule for DayRule {
    fn field(&self) -> ConfigField {
        ConfigField::Day
    }

    fn validate(&self, value: &str) -> Result<(), EditError> {
        digits("day", value, 2)
    }

    fn rewrite(
        &self,
        _line_number: usize,
        body: &str,
        value: &str,
    ) -> Result<Option<String>, EditError> {
        Ok(date_component(body, 1).map(|range| splice(body, vec![(range, value.into())])))
    }

    fn current(&self, body: &str) -> Option<String> {
        date_component(body, 1).map(|range| body[range].to_string())
    }
}

/// `\MM` segment on test-collection/database lines, `MM` of `vbdatum`.
#[derive(Debug, Clone, Copy)]
pub struct MonthRule;

impl MonthRule {
    fn target(body: &str) -> Option<Range<usize>> {
        if is_path_line(body) {
            MONTH_SEGMENT
                .captures(body)
                .and_then(|caps| caps.get(1))
                .map(|m| m.range())
        } else {
            date_component(body, 2)
        }
    }
}

impl LineRule for MonthRule {
    fn field(&self) -> ConfigField {
        ConfigField::Month
    }

    fn validate(&self, value: &str) -> Result<(), EditError> {
        digits("month", value, 2)
    }

    fn rewrite(
        &self,
        _line_number: usize,
        body: &str,
        value: &str,
    ) -> Result<Option<String>, EditError> {
        Ok(Self::target(body).map(|range| splice(body, vec![(range, value.into())])))
    }

    fn current(&self, body: &str) -> Option<String> {
        Self::target(body).map(|range| body[range].to_string())
    }
}

/// `YYYY` of a `\MM-YYYY` segment, the year part of a `.mdb` name on the
/// database line (width kept), `YYYY` of `vbdatum`.
#[derive(Debug, Clone, Copy)]
pub struct YearRule;

impl YearRule {
    fn segment_year(body: &str) -> Option<Range<usize>> {
        MONTH_SEGMENT
            .captures(body)
            .and_then(|caps| caps.get(2))
            .map(|m| m.range())
    }
}

impl LineRule for YearRule {
    fn field(&self) -> ConfigField {
        ConfigField::Year
    }

    fn validate(&self, value: &str) -> Result<(), EditError> {
        digits("year", value, 4)
    }

    fn rewrite(
        &self,
        line_number: usize,
        body: &str,
        value: &str,
    ) -> Result<Option<String>, EditError> {
        if COLLECTION_ANCHOR.is_match(body) {
            return Ok(Self::segment_year(body).map(|range| splice(body, vec![(range, value.into())])));
        }

        if DATABASE_ANCHOR.is_match(body) {
            let mut edits = Vec::new();
            if let Some(range) = Self::segment_year(body) {
                edits.push((range, value.to_string()));
            }
            if body.contains(".mdb") {
                let year = DATABASE_NAME
                    .captures(body)
                    .and_then(|caps| caps.get(1))
                    .ok_or_else(|| EditError::UnrecognisedDatabaseName {
                        line_number,
                        line: body.to_string(),
                    })?;
                let replacement = if year.len() == 2 {
                    value.get(2..).unwrap_or(value)
                } else {
                    value
                };
                edits.push((year.range(), replacement.to_string()));
            }
            return Ok((!edits.is_empty()).then(|| splice(body, edits)));
        }

        Ok(date_component(body, 3).map(|range| splice(body, vec![(range, value.into())])))
    }

    fn current(&self, body: &str) -> Option<String> {
        if is_path_line(body) {
            Self::segment_year(body).map(|range| body[range].to_string())
        } else {
            date_component(body, 3).map(|range| body[range].to_string())
        }
    }
}

/// `Kategorie = "<value>"` on lines carrying the `Kategorie:` anchor.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule;

impl LineRule for CategoryRule {
    fn field(&self) -> ConfigField {
        ConfigField::Category
    }

    fn validate(&self, value: &str) -> Result<(), EditError> {
        quotable("category", value)
    }

    fn rewrite(
        &self,
        _line_number: usize,
        body: &str,
        value: &str,
    ) -> Result<Option<String>, EditError> {
        if !CATEGORY_ANCHOR.is_match(body) {
            return Ok(None);
        }
        Ok(Some(match quoted_value(&CATEGORY_VALUE, body) {
            Some(range) => splice(body, vec![(range, value.into())]),
            None => format!("Kategorie:    = \"{value}\""),
        }))
    }

    fn current(&self, body: &str) -> Option<String> {
        if !CATEGORY_ANCHOR.is_match(body) {
            return None;
        }
        quoted_value(&CATEGORY_VALUE, body).map(|range| body[range].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(rule: &dyn LineRule, body: &str, value: &str) -> Option<String> {
        rule.rewrite(1, body, value).unwrap()
    }

    #[test]
    fn test_prefix_keeps_spacing() {
        assert_eq!(
            rewrite(&PrefixRule, r#"praefix      = "OLD""#, "NEW").as_deref(),
            Some(r#"praefix      = "NEW""#)
        );
        assert_eq!(
            rewrite(&PrefixRule, r#"  praefix="" ' comment"#, "X").as_deref(),
            Some(r#"  praefix="X" ' comment"#)
        );
        assert_eq!(rewrite(&PrefixRule, "build = \"1\"", "X"), None);
    }

    #[test]
    fn test_build_requires_word_boundary() {
        assert_eq!(
            rewrite(&BuildRule, r#"build        = "4711""#, "4712").as_deref(),
            Some(r#"build        = "4712""#)
        );
        assert_eq!(rewrite(&BuildRule, r#"rebuild = "x""#, "y"), None);
    }

    #[test]
    fn test_day_only_touches_day() {
        assert_eq!(
            rewrite(&DayRule, "vbdatum      = 05.03.2024", "17").as_deref(),
            Some("vbdatum      = 17.03.2024")
        );
        // Date without the anchor is not a target.
        assert_eq!(rewrite(&DayRule, "stand = 05.03.2024", "17"), None);
    }

    #[test]
    fn test_day_does_not_touch_equal_digits_elsewhere() {
        // A plain text substitution of "05" would also hit the year.
        assert_eq!(
            rewrite(&DayRule, "vbdatum = 05.05.2005", "17").as_deref(),
            Some("vbdatum = 17.05.2005")
        );
    }

    #[test]
    fn test_month_on_path_lines() {
        assert_eq!(
            rewrite(
                &MonthRule,
                r#"testsammlung = "\\srv\tests\03-2024\basis""#,
                "11"
            )
            .as_deref(),
            Some(r#"testsammlung = "\\srv\tests\11-2024\basis""#)
        );
        assert_eq!(
            rewrite(&MonthRule, r#"TestDB       = "\\srv\db\03\2403.mdb""#, "04").as_deref(),
            Some(r#"TestDB       = "\\srv\db\04\2403.mdb""#)
        );
    }

    #[test]
    fn test_month_skips_non_segment_digits() {
        // "\12abc" is not a month segment; "\03" is.
        assert_eq!(
            rewrite(&MonthRule, r#"testsammlung = "\\srv\12abc\03\x""#, "09").as_deref(),
            Some(r#"testsammlung = "\\srv\12abc\09\x""#)
        );
    }

    #[test]
    fn test_month_on_date_line() {
        assert_eq!(
            rewrite(&MonthRule, "vbdatum      = 05.03.2024", "12").as_deref(),
            Some("vbdatum      = 05.12.2024")
        );
    }

    #[test]
    fn test_year_on_collection_line() {
        assert_eq!(
            rewrite(&YearRule, r#"testsammlung = "\\srv\t\03-2024\b""#, "2025").as_deref(),
            Some(r#"testsammlung = "\\srv\t\03-2025\b""#)
        );
    }

    #[test]
    fn test_year_database_two_digit_name() {
        assert_eq!(
            rewrite(&YearRule, r#"TestDB       = "\\srv\db\03-2024\2403.mdb""#, "2025").as_deref(),
            Some(r#"TestDB       = "\\srv\db\03-2025\2503.mdb""#)
        );
    }

    #[test]
    fn test_year_database_four_digit_name() {
        assert_eq!(
            rewrite(&YearRule, r#"TestDB       = "\\srv\db\03-2024\202403.mdb""#, "2025").as_deref(),
            Some(r#"TestDB       = "\\srv\db\03-2025\202503.mdb""#)
        );
    }

    #[test]
    fn test_year_unrecognised_database_name_is_error() {
        let err = YearRule
            .rewrite(7, r#"TestDB       = "\\srv\db\03-2024\archive.mdb""#, "2025")
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::UnrecognisedDatabaseName { line_number: 7, .. }
        ));
    }

    #[test]
    fn test_year_on_date_line() {
        assert_eq!(
            rewrite(&YearRule, "vbdatum      = 05.03.2024", "2026").as_deref(),
            Some("vbdatum      = 05.03.2026")
        );
    }

    #[test]
    fn test_category_replaces_value() {
        assert_eq!(
            rewrite(&CategoryRule, r#"public Kategorie:    Kategorie = "A""#, "Kategorie_B")
                .as_deref(),
            Some(r#"public Kategorie:    Kategorie = "Kategorie_B""#)
        );
    }

    #[test]
    fn test_category_anchor_without_value_is_rewritten() {
        assert_eq!(
            rewrite(&CategoryRule, "Kategorie: (none)", "Kategorie_B").as_deref(),
            Some(r#"Kategorie:    = "Kategorie_B""#)
        );
        // The rewritten line is recognised on the next pass.
        assert_eq!(
            CategoryRule.current(r#"Kategorie:    = "Kategorie_B""#).as_deref(),
            Some("Kategorie_B")
        );
    }

    #[test]
    fn test_value_validation() {
        assert!(DayRule.validate("7").is_err());
        assert!(MonthRule.validate("1a").is_err());
        assert!(YearRule.validate("24").is_err());
        assert!(YearRule.validate("2024").is_ok());
        assert!(PrefixRule.validate("a\"b").is_err());
        assert!(CategoryRule.validate("Kategorie_X").is_ok());
    }

    #[test]
    fn test_splice_drops_overlaps() {
        assert_eq!(
            splice("abcdef", vec![(3..5, "X".into()), (0..1, "Y".into()), (4..6, "Z".into())]),
            "YbcXf"
        );
    }
}
