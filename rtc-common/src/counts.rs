//! Expected test-case counts per category.
//!
//! Counts come from JSON exports of the test database, one file per module:
//!
//! ```json
//! { "TestfaelleJeKategorien": [ { "Kategorie_Anlage": 12 }, { "Kategorie_Suche": 4 } ] }
//! ```
//!
//! The file is found by matching the module name (case-insensitive) against
//! the `.json` file names of the count directory. Every failure degrades to
//! a count of 0.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use serde::Deserialize;
use tracing::{debug, warn};

/// Source of the expected test-case count of a category.
pub trait CountSource: Send + Sync {
    /// Expected count, 0 when unknown.
    fn expected_count(&self, module: &str, category: &str) -> impl Future<Output = u32> + Send;
}

#[derive(Debug, Default, Deserialize)]
struct CountDocument {
    #[serde(rename = "TestfaelleJeKategorien", default)]
    entries: Vec<HashMap<String, serde_json::Value>>,
}

impl CountDocument {
    fn count_for(&self, category: &str) -> Option<u32> {
        self.entries
            .iter()
            .find_map(|entry| entry.get(category))
            .and_then(serde_json::Value::as_u64)
            .and_then(|count| u32::try_from(count).ok())
    }
}

/// Reads counts from `<dir>/*<module>*.json`.
#[derive(Debug, Clone)]
pub struct JsonCountSource {
    dir: PathBuf,
}

impl JsonCountSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First `.json` file (by name) whose name contains `module`.
    pub async fn find_file(&self, module: &str) -> std::io::Result<Option<PathBuf>> {
        let pattern = RegexBuilder::new(&regex::escape(module))
            .case_insensitive(true)
            .build()
            .map_err(std::io::Error::other)?;

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str()
                && name.ends_with(".json")
                && pattern.is_match(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names.into_iter().next().map(|name| self.dir.join(name)))
    }

    async fn load(&self, module: &str) -> anyhow::Result<Option<CountDocument>> {
        let Some(path) = self.find_file(module).await? else {
            return Ok(None);
        };
        let content = tokio::fs::read_to_string(&path).await?;
        let document = serde_json::from_str(&content)?;
        debug!(path = %path.display(), module, "Loaded count file");
        Ok(Some(document))
    }
}

impl CountSource for JsonCountSource {
    async fn expected_count(&self, module: &str, category: &str) -> u32 {
        match self.load(module).await {
            Ok(Some(document)) => document.count_for(category).unwrap_or(0),
            Ok(None) => {
                warn!(dir = %self.dir.display(), module, "No count file for module");
                0
            }
            Err(err) => {
                warn!(dir = %self.dir.display(), module, "Failed to read count file: {:#}", err);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_count_from_matching_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "Eintraege_BASIS_2024.json",
            r#"{"TestfaelleJeKategorien":[{"Kategorie_Anlage":12},{"Kategorie_Suche":4}]}"#,
        );
        write(&dir, "Eintraege_Export.json", r#"{"TestfaelleJeKategorien":[{"Kategorie_Anlage":99}]}"#);
        write(&dir, "basis_notes.txt", "not json");

        let source = JsonCountSource::new(dir.path());
        assert_eq!(source.expected_count("Basis", "Kategorie_Anlage").await, 12);
        assert_eq!(source.expected_count("Basis", "Kategorie_Suche").await, 4);
        assert_eq!(source.expected_count("Export", "Kategorie_Anlage").await, 99);
    }

    #[tokio::test]
    async fn test_unknown_inputs_degrade_to_zero() {
        let dir = TempDir::new().unwrap();
        write(&dir, "basis.json", r#"{"TestfaelleJeKategorien":[{"Kategorie_A":"viele"}]}"#);
        write(&dir, "export.json", "{ kaputt");

        let source = JsonCountSource::new(dir.path());
        assert_eq!(source.expected_count("Basis", "Kategorie_A").await, 0);
        assert_eq!(source.expected_count("Basis", "Kategorie_B").await, 0);
        assert_eq!(source.expected_count("Export", "Kategorie_A").await, 0);
        assert_eq!(source.expected_count("Import", "Kategorie_A").await, 0);

        let missing = JsonCountSource::new(dir.path().join("fehlt"));
        assert_eq!(missing.expected_count("Basis", "Kategorie_A").await, 0);
    }
}
