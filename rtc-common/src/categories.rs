//! Test category discovery from a module's declaration file.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::client::{Access, RemoteFileClient};
use crate::config::join;
use crate::error::RemoteError;
use crate::scan::CATEGORY_PREFIX;
use crate::transport::ShareTransport;
use crate::types::HostId;

static DECLARATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public\s+Kategorie:\s+Kategorie").expect("literal regex pattern")
});

static DECLARATION_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Kategorie\s*=\s*"([^"]*)""#).expect("literal regex pattern")
});

/// Normalise a declared name to the `Kategorie_` form.
pub fn normalize_category(name: &str) -> String {
    let name = name.trim();
    if name.starts_with("Kategorie_") {
        name.to_string()
    } else {
        format!("{CATEGORY_PREFIX}_{name}")
    }
}

/// Categories declared by the first uncommented `public Kategorie:` line.
///
/// Returns `None` when no such line carries a quoted value.
pub fn parse_category_declaration(text: &str) -> Option<Vec<String>> {
    let line = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('\''))
        .find(|line| DECLARATION_LINE.is_match(line))?;
    let caps = DECLARATION_VALUE.captures(line)?;
    Some(
        caps[1]
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(normalize_category)
            .collect(),
    )
}

/// Looks up a module's category list in the test-source tree.
pub struct CategoryCatalog<T> {
    client: RemoteFileClient<T>,
    source_dir: String,
    declaration_file: String,
}

impl<T: ShareTransport> CategoryCatalog<T> {
    pub fn new(
        client: RemoteFileClient<T>,
        source_dir: impl Into<String>,
        declaration_file: impl Into<String>,
    ) -> Self {
        Self {
            client,
            source_dir: source_dir.into(),
            declaration_file: declaration_file.into(),
        }
    }

    /// First source directory whose name contains `module`, ignoring case.
    pub async fn module_dir(&self, host: &HostId, module: &str) -> Result<Option<String>, RemoteError> {
        let needle = module.to_lowercase();
        let dirs = self.client.list_dirs(Access::vm(host), &self.source_dir).await?;
        Ok(dirs
            .into_iter()
            .find(|dir| dir.to_lowercase().contains(&needle))
            .map(|dir| join(&self.source_dir, &dir)))
    }

    /// Declared categories of `module`; empty when the module or its
    /// declaration is missing.
    pub async fn discover(&self, host: &HostId, module: &str) -> Result<Vec<String>, RemoteError> {
        let Some(dir) = self.module_dir(host, module).await? else {
            debug!(host = %host, module, "Module not found in test sources");
            return Ok(Vec::new());
        };
        let path = join(&dir, &self.declaration_file);
        let file = self.client.read_text(Access::vm(host), &path).await?;
        let categories = parse_category_declaration(&file.text).unwrap_or_default();
        debug!(host = %host, module, count = categories.len(), "Discovered categories");
        Ok(categories)
    }
}
