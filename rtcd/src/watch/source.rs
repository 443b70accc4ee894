//! Filesystem change notification for one overview file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Watches a file's parent directory and signals `tx` when the file is
/// created or modified. Signals coalesce while one is pending.
///
/// The watch is torn down when this value is dropped.
pub struct FileWatch {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatch {
    pub fn start(path: &Path, tx: mpsc::Sender<()>) -> anyhow::Result<Self> {
        let name: OsString = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?
            .to_os_string();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == Some(name.as_os_str()))
                {
                    // Full means a change is already pending.
                    let _ = tx.try_send(());
                }
            }
            Err(err) => warn!("File watch error: {}", err),
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", parent.display()))?;
        debug!(path = %path.display(), "File watch started");

        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "File watch stopped");
    }
}
