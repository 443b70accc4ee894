//! The shared 4-line controlling file.
//!
//! ```text
//! 1: DD.MM.YYYY   date
//! 2: <build>
//! 3: <update marker>
//! 4: <prefix>
//! ```
//!
//! Fields are addressed by line number, not by anchor.

use serde::Serialize;

use crate::error::EditError;
use crate::text::{self, TextEncoding};

use super::document::ConfigDocument;
use super::rules::DATE_VALUE;

const DATE_LINE: usize = 1;
const BUILD_LINE: usize = 2;
const UPDATE_LINE: usize = 3;
const PREFIX_LINE: usize = 4;

/// Field of the controlling file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllingField {
    Day,
    Month,
    Year,
    Build,
    Update,
    Prefix,
}

impl ControllingField {
    pub fn line(self) -> usize {
        match self {
            Self::Day | Self::Month | Self::Year => DATE_LINE,
            Self::Build => BUILD_LINE,
            Self::Update => UPDATE_LINE,
            Self::Prefix => PREFIX_LINE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Day => "Day",
            Self::Month => "Month",
            Self::Year => "Year",
            Self::Build => "Build",
            Self::Update => "Update",
            Self::Prefix => "Prefix",
        }
    }
}

/// Whether a requested field could be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    Changed,
    NotChanged,
}

/// Per-field result of a controlling edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllingReport {
    pub outcomes: Vec<(ControllingField, FieldOutcome)>,
}

impl ControllingReport {
    pub fn outcome(&self, field: ControllingField) -> Option<FieldOutcome> {
        self.outcomes
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, outcome)| *outcome)
    }

    pub fn any_changed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| *outcome == FieldOutcome::Changed)
    }

    /// Human-readable status line per requested field.
    pub fn messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|(field, outcome)| {
                let verdict = match outcome {
                    FieldOutcome::Changed => "changed",
                    FieldOutcome::NotChanged => "could not be changed",
                };
                format!(
                    "{} in controlling file (line {}) {}",
                    field.label(),
                    field.line(),
                    verdict
                )
            })
            .collect()
    }
}

/// Requested changes; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllingEdit {
    pub day: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub build: Option<String>,
    pub update: Option<String>,
    pub prefix: Option<String>,
}

impl ControllingEdit {
    pub fn is_empty(&self) -> bool {
        self.requested().next().is_none()
    }

    fn requested(&self) -> impl Iterator<Item = (ControllingField, &str)> {
        [
            (ControllingField::Day, &self.day),
            (ControllingField::Month, &self.month),
            (ControllingField::Year, &self.year),
            (ControllingField::Build, &self.build),
            (ControllingField::Update, &self.update),
            (ControllingField::Prefix, &self.prefix),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
    }

    /// Reject values the controlling file's encoding cannot store.
    pub fn check_encodable(&self, encoding: TextEncoding) -> Result<(), EditError> {
        self.requested()
            .try_for_each(|(field, value)| text::check_encodable(field.label(), value, encoding))
    }

    fn validate(&self) -> Result<(), EditError> {
        for (field, value) in self.requested() {
            let ok = match field {
                ControllingField::Day | ControllingField::Month => {
                    value.len() == 2 && value.bytes().all(|b| b.is_ascii_digit())
                }
                ControllingField::Year => {
                    value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit())
                }
                _ => !value.contains(['\r', '\n']),
            };
            if !ok {
                return Err(EditError::InvalidValue {
                    field: field.label(),
                    value: value.to_string(),
                    expected: match field {
                        ControllingField::Day | ControllingField::Month => "two digits",
                        ControllingField::Year => "four digits",
                        _ => "a single line",
                    },
                });
            }
        }
        Ok(())
    }

    /// Apply to a document, reporting every requested field.
    pub fn apply(
        &self,
        document: &ConfigDocument,
    ) -> Result<(ConfigDocument, ControllingReport), EditError> {
        self.validate()?;
        let mut next = document.clone();
        let mut report = ControllingReport::default();

        for (field, value) in self.requested() {
            let changed = match field {
                ControllingField::Day | ControllingField::Month | ControllingField::Year => {
                    let group = match field {
                        ControllingField::Day => 1,
                        ControllingField::Month => 2,
                        _ => 3,
                    };
                    replace_date_component(&mut next, group, value)
                }
                _ => next.set_line(field.line(), value),
            };
            let outcome = if changed {
                FieldOutcome::Changed
            } else {
                FieldOutcome::NotChanged
            };
            report.outcomes.push((field, outcome));
        }

        Ok((next, report))
    }
}

fn replace_date_component(document: &mut ConfigDocument, group: usize, value: &str) -> bool {
    let Some(body) = document.line(DATE_LINE) else {
        return false;
    };
    let Some(range) = DATE_VALUE
        .captures(body)
        .and_then(|caps| caps.get(group))
        .map(|m| m.range())
    else {
        return false;
    };
    let rewritten = format!("{}{}{}", &body[..range.start], value, &body[range.end..]);
    document.set_line(DATE_LINE, &rewritten)
}

/// Parsed controlling file; absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllingSnapshot {
    pub day: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub build: Option<String>,
    pub update: Option<String>,
    pub prefix: Option<String>,
}

impl ControllingSnapshot {
    pub fn parse(document: &ConfigDocument) -> Self {
        let date = document
            .line(DATE_LINE)
            .and_then(|line| DATE_VALUE.captures(line));
        let part = |group: usize| {
            date.as_ref()
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string())
        };
        let text_line = |number: usize| {
            document
                .line(number)
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
        };

        Self {
            day: part(1),
            month: part(2),
            year: part(3),
            build: text_line(BUILD_LINE),
            update: text_line(UPDATE_LINE),
            prefix: text_line(PREFIX_LINE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLING: &str = "05.03.2024\r\n4711\r\nja\r\nREG\r\n";

    #[test]
    fn test_snapshot_parse() {
        let snapshot = ControllingSnapshot::parse(&ConfigDocument::parse(CONTROLLING));
        assert_eq!(snapshot.day.as_deref(), Some("05"));
        assert_eq!(snapshot.month.as_deref(), Some("03"));
        assert_eq!(snapshot.year.as_deref(), Some("2024"));
        assert_eq!(snapshot.build.as_deref(), Some("4711"));
        assert_eq!(snapshot.update.as_deref(), Some("ja"));
        assert_eq!(snapshot.prefix.as_deref(), Some("REG"));
    }

    #[test]
    fn test_snapshot_of_short_file() {
        let snapshot = ControllingSnapshot::parse(&ConfigDocument::parse("kein datum\n"));
        assert_eq!(snapshot, ControllingSnapshot::default());
    }

    #[test]
    fn test_edit_date_components_and_lines() {
        let edit = ControllingEdit {
            day: Some("17".into()),
            year: Some("2025".into()),
            build: Some("4712".into()),
            prefix: Some("NEU".into()),
            ..Default::default()
        };
        let (doc, report) = edit.apply(&ConfigDocument::parse(CONTROLLING)).unwrap();
        assert_eq!(doc.to_text(), "17.03.2025\r\n4712\r\nja\r\nNEU\r\n");
        assert_eq!(report.outcomes.len(), 4);
        assert!(report.any_changed());
        assert_eq!(
            report.outcome(ControllingField::Build),
            Some(FieldOutcome::Changed)
        );
        assert_eq!(report.outcome(ControllingField::Month), None);
    }

    #[test]
    fn test_day_edit_does_not_hit_equal_month() {
        let edit = ControllingEdit {
            day: Some("09".into()),
            ..Default::default()
        };
        let (doc, _) = edit
            .apply(&ConfigDocument::parse("03.03.2024\n1\n2\n3\n"))
            .unwrap();
        assert_eq!(doc.line(1), Some("09.03.2024"));
    }

    #[test]
    fn test_missing_lines_are_reported_not_changed() {
        let edit = ControllingEdit {
            month: Some("04".into()),
            prefix: Some("X".into()),
            ..Default::default()
        };
        let (doc, report) = edit.apply(&ConfigDocument::parse("no date\n")).unwrap();
        assert_eq!(doc.to_text(), "no date\n");
        assert_eq!(
            report.outcome(ControllingField::Month),
            Some(FieldOutcome::NotChanged)
        );
        assert_eq!(
            report.outcome(ControllingField::Prefix),
            Some(FieldOutcome::NotChanged)
        );
        assert!(!report.any_changed());
        assert_eq!(
            report.messages()[1],
            "Prefix in controlling file (line 4) could not be changed"
        );
    }

    #[test]
    fn test_invalid_value_rejected() {
        let edit = ControllingEdit {
            year: Some("25".into()),
            ..Default::default()
        };
        assert!(matches!(
            edit.apply(&ConfigDocument::parse(CONTROLLING)),
            Err(EditError::InvalidValue { field: "Year", .. })
        ));
        assert!(ControllingEdit::default().is_empty());
    }

    #[test]
    fn test_prefix_outside_latin1_rejected_for_latin1_file() {
        let edit = ControllingEdit {
            prefix: Some("REG→2".into()),
            ..Default::default()
        };
        assert!(matches!(
            edit.check_encodable(TextEncoding::Latin1),
            Err(EditError::Unencodable { field: "Prefix", character: '→', .. })
        ));
        assert!(edit.check_encodable(TextEncoding::Utf8).is_ok());
    }
}
