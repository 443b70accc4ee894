//! Regex-anchored edits of small remote configuration files.
//!
//! Every edit is a fresh read-modify-write round trip: the file is read,
//! the field's [`LineRule`] rewrites its target lines, and the result is
//! written back. If the read fails nothing is written. There is no
//! concurrency control; the last writer wins.

pub mod controlling;
pub mod document;
pub mod rules;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{Access, RemoteFileClient};
use crate::error::EditError;
use crate::text;
use crate::transport::ShareTransport;

pub use controlling::{
    ControllingEdit, ControllingField, ControllingReport, ControllingSnapshot, FieldOutcome,
};
pub use document::ConfigDocument;
pub use rules::{LineRule, rule_for};

/// Editable field of a test configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    Prefix,
    Build,
    Day,
    Month,
    Year,
    Category,
}

impl ConfigField {
    pub const ALL: [ConfigField; 6] = [
        Self::Prefix,
        Self::Build,
        Self::Day,
        Self::Month,
        Self::Year,
        Self::Category,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Build => "build",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
            Self::Category => "category",
        }
    }
}

impl std::fmt::Display for ConfigField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

/// Result of applying one field edit to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub document: ConfigDocument,
    /// 1-based numbers of the lines the rule targeted.
    pub touched: Vec<usize>,
}

impl Applied {
    pub fn changed_from(&self, original: &ConfigDocument) -> bool {
        &self.document != original
    }
}

impl ConfigDocument {
    /// Rewrite the lines targeted by `field`'s rule; all other lines pass
    /// through unchanged.
    pub fn apply(&self, field: ConfigField, value: &str) -> Result<Applied, EditError> {
        let rule = rule_for(field);
        rule.validate(value)?;

        let mut document = self.clone();
        let mut touched = Vec::new();
        let rewrites: Vec<(usize, String)> = self
            .bodies()
            .enumerate()
            .filter_map(|(idx, body)| {
                rule.rewrite(idx + 1, body, value)
                    .transpose()
                    .map(|rewritten| rewritten.map(|line| (idx + 1, line)))
            })
            .collect::<Result<_, _>>()?;

        for (number, line) in rewrites {
            document.set_line(number, &line);
            touched.push(number);
        }
        Ok(Applied { document, touched })
    }

    /// Value held by the first line `field`'s rule targets.
    pub fn current_value(&self, field: ConfigField) -> Option<String> {
        let rule = rule_for(field);
        self.bodies().find_map(|body| rule.current(body))
    }
}

/// Outcome of a remote field edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub field: ConfigField,
    pub touched: Vec<usize>,
    /// False when the content was already up to date.
    pub written: bool,
}

/// Remote read-modify-write front end for [`ConfigDocument::apply`] and
/// [`ControllingEdit`].
pub struct ConfigLineEditor<T> {
    client: RemoteFileClient<T>,
}

impl<T: ShareTransport> ConfigLineEditor<T> {
    pub fn new(client: RemoteFileClient<T>) -> Self {
        Self { client }
    }

    /// Edit one field of a remote configuration file.
    pub async fn edit(
        &self,
        access: Access<'_>,
        path: &str,
        field: ConfigField,
        value: &str,
    ) -> Result<EditOutcome, EditError> {
        rule_for(field).validate(value)?;
        let file = self.client.read_text(access, path).await?;
        text::check_encodable(field.as_str(), value, file.encoding)?;
        let original = ConfigDocument::parse(&file.text);
        let applied = original.apply(field, value)?;

        let written = applied.changed_from(&original);
        if written {
            self.client
                .write_text(access, path, &applied.document.to_text(), file.encoding)
                .await?;
            info!(path, %field, lines = ?applied.touched, "Config field updated");
        } else {
            debug!(path, %field, "Config field already up to date");
        }

        Ok(EditOutcome {
            field,
            touched: applied.touched,
            written,
        })
    }

    /// Read and parse the controlling file.
    pub async fn read_controlling(&self, path: &str) -> Result<ControllingSnapshot, EditError> {
        let file = self.client.read_text(Access::session(), path).await?;
        Ok(ControllingSnapshot::parse(&ConfigDocument::parse(&file.text)))
    }

    /// Apply a controlling edit, reporting per-field outcome.
    pub async fn edit_controlling(
        &self,
        path: &str,
        edit: &ControllingEdit,
    ) -> Result<ControllingReport, EditError> {
        let access = Access::session();
        let file = self.client.read_text(access, path).await?;
        edit.check_encodable(file.encoding)?;
        let original = ConfigDocument::parse(&file.text);
        let (next, report) = edit.apply(&original)?;

        if next != original {
            self.client
                .write_text(access, path, &next.to_text(), file.encoding)
                .await?;
            info!(path, "Controlling file updated");
        }
        for message in report.messages() {
            debug!(path, "{}", message);
        }
        Ok(report)
    }
}
