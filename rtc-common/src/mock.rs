//! In-memory collaborators for tests.
//!
//! `MockShare` holds files in memory, can be scripted to fail specific paths
//! (locked N times, auth failure, missing) and counts every protocol call so
//! tests can assert that no network round trip happened. `FixedCounts`
//! serves expected test-case counts from a map.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::counts::CountSource;
use crate::error::TransportError;
use crate::transport::{RemoteFile, ShareTransport};
use crate::types::{Credentials, OpenMode};

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    /// Failures consumed one per call, before `sticky` is consulted.
    scripted: HashMap<String, VecDeque<TransportError>>,
    sticky: HashMap<String, TransportError>,
    open_calls: HashMap<String, u32>,
    list_calls: u32,
    exists_calls: u32,
    writes: u32,
    last_username: Option<String>,
}

impl MockState {
    fn take_failure(&mut self, path: &str) -> Option<TransportError> {
        if let Some(queue) = self.scripted.get_mut(path)
            && let Some(err) = queue.pop_front()
        {
            return Some(err);
        }
        self.sticky.get(path).cloned()
    }

    fn register_ancestors(&mut self, path: &str) {
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('/') {
            if parent.is_empty() || parent.chars().all(|c| c == '/') {
                break;
            }
            self.dirs.insert(parent.to_string());
            current = parent;
        }
    }
}

/// In-memory [`ShareTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockShare {
    state: Arc<Mutex<MockState>>,
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        path
    } else {
        trimmed.to_string()
    }
}

impl MockShare {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Setup ──────────────────────────────────────────────────────────

    /// Builder-style [`insert_file`](Self::insert_file).
    pub fn with_file(self, path: &str, contents: impl AsRef<[u8]>) -> Self {
        self.insert_file(path, contents);
        self
    }

    /// Builder-style [`insert_dir`](Self::insert_dir).
    pub fn with_dir(self, path: &str) -> Self {
        self.insert_dir(path);
        self
    }

    /// Create or replace a file (parent directories are implied).
    pub fn insert_file(&self, path: &str, contents: impl AsRef<[u8]>) {
        let path = normalize(path);
        let mut state = self.lock();
        state.register_ancestors(&path);
        state.files.insert(path, contents.as_ref().to_vec());
    }

    pub fn insert_dir(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.lock();
        state.register_ancestors(&path);
        state.dirs.insert(path);
    }

    // ── Failure scripting ──────────────────────────────────────────────

    /// Fail the next `times` calls on `path` with a lock violation.
    pub fn fail_locked(&self, path: &str, times: u32) {
        let mut state = self.lock();
        let queue = state.scripted.entry(normalize(path)).or_default();
        for _ in 0..times {
            queue.push_back(TransportError::locked("used by another process"));
        }
    }

    /// Fail the next call on `path` with the given error.
    pub fn fail_next(&self, path: &str, err: TransportError) {
        self.lock()
            .scripted
            .entry(normalize(path))
            .or_default()
            .push_back(err);
    }

    /// Fail every call on `path` with the given error.
    pub fn fail_always(&self, path: &str, err: TransportError) {
        self.lock().sticky.insert(normalize(path), err);
    }

    pub fn clear_failures(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.lock();
        state.scripted.remove(&path);
        state.sticky.remove(&path);
    }

    // ── Inspection ─────────────────────────────────────────────────────

    pub fn file_text(&self, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&normalize(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn file_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&normalize(path)).cloned()
    }

    /// Total `open` calls across all paths.
    pub fn open_calls(&self) -> u32 {
        self.lock().open_calls.values().sum()
    }

    pub fn open_calls_for(&self, path: &str) -> u32 {
        self.lock()
            .open_calls
            .get(&normalize(path))
            .copied()
            .unwrap_or(0)
    }

    pub fn list_calls(&self) -> u32 {
        self.lock().list_calls
    }

    /// Every protocol call made, of any kind.
    pub fn total_calls(&self) -> u32 {
        let state = self.lock();
        state.open_calls.values().sum::<u32>() + state.list_calls + state.exists_calls
    }

    pub fn write_count(&self) -> u32 {
        self.lock().writes
    }

    pub fn last_username(&self) -> Option<String> {
        self.lock().last_username.clone()
    }
}

/// File handle returned by [`MockShare`].
#[derive(Debug)]
pub struct MockFile {
    state: Arc<Mutex<MockState>>,
    path: String,
    mode: OpenMode,
}

impl MockFile {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RemoteFile for MockFile {
    async fn read_all(&mut self) -> Result<Vec<u8>, TransportError> {
        self.lock()
            .files
            .get(&self.path)
            .cloned()
            .ok_or_else(|| TransportError::not_found(self.path.clone()))
    }

    async fn write_all(&mut self, contents: &[u8]) -> Result<(), TransportError> {
        if self.mode != OpenMode::Write {
            return Err(TransportError::other(format!(
                "{} opened read-only",
                self.path
            )));
        }
        let mut state = self.lock();
        state.writes += 1;
        state.files.insert(self.path.clone(), contents.to_vec());
        Ok(())
    }
}

impl ShareTransport for MockShare {
    type File = MockFile;

    async fn open(
        &self,
        path: &str,
        mode: OpenMode,
        credentials: &Credentials,
    ) -> Result<MockFile, TransportError> {
        let path = normalize(path);
        let mut state = self.lock();
        *state.open_calls.entry(path.clone()).or_default() += 1;
        state.last_username = Some(credentials.username.clone());

        if let Some(err) = state.take_failure(&path) {
            return Err(err);
        }
        match mode {
            OpenMode::Read if !state.files.contains_key(&path) => {
                return Err(TransportError::not_found(path));
            }
            OpenMode::Read => {}
            OpenMode::Write => {
                state.register_ancestors(&path);
                state.files.entry(path.clone()).or_default();
            }
        }
        drop(state);

        Ok(MockFile {
            state: self.state.clone(),
            path,
            mode,
        })
    }

    async fn list_dirs(
        &self,
        path: &str,
        _credentials: &Credentials,
    ) -> Result<Vec<String>, TransportError> {
        let path = normalize(path);
        let mut state = self.lock();
        state.list_calls += 1;

        if let Some(err) = state.take_failure(&path) {
            return Err(err);
        }
        if !state.dirs.contains(&path) {
            return Err(TransportError::not_found(path));
        }
        Ok(state
            .dirs
            .iter()
            .filter_map(|dir| match dir.rsplit_once('/') {
                Some((parent, name)) if parent == path => Some(name.to_string()),
                _ => None,
            })
            .collect())
    }

    async fn exists(&self, path: &str, _credentials: &Credentials) -> Result<bool, TransportError> {
        let path = normalize(path);
        let mut state = self.lock();
        state.exists_calls += 1;

        if let Some(err) = state.take_failure(&path) {
            return Err(err);
        }
        Ok(state.files.contains_key(&path) || state.dirs.contains(&path))
    }
}

// ── Counts ─────────────────────────────────────────────────────────────

/// [`CountSource`] backed by a category → count map; unknown categories
/// count 0.
#[derive(Debug, Clone, Default)]
pub struct FixedCounts {
    counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl FixedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, category: &str, count: u32) -> Self {
        self.set(category, count);
        self
    }

    pub fn set(&self, category: &str, count: u32) {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(category.to_string(), count);
    }
}

impl CountSource for FixedCounts {
    async fn expected_count(&self, _module: &str, category: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(category)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;

    fn creds() -> Credentials {
        Credentials::new("tester", "pw")
    }

    #[tokio::test]
    async fn test_read_existing_file() {
        let share = MockShare::new().with_file(r"\\masch1\c$\a.txt", "hello");
        let mut file = share
            .open(r"\\masch1\c$\a.txt", OpenMode::Read, &creds())
            .await
            .unwrap();
        assert_eq!(file.read_all().await.unwrap(), b"hello");
        assert_eq!(share.open_calls_for(r"\\masch1\c$\a.txt"), 1);
        assert_eq!(share.last_username().as_deref(), Some("tester"));
    }

    #[tokio::test]
    async fn test_separators_are_interchangeable() {
        let share = MockShare::new().with_file(r"\\masch1\c$\a.txt", "x");
        assert!(share.exists("//masch1/c$/a.txt", &creds()).await.unwrap());
    }

    #[tokio::test]
    async fn test_scripted_lock_failures_are_consumed() {
        let share = MockShare::new().with_file("/s/a.txt", "x");
        share.fail_locked("/s/a.txt", 2);

        for _ in 0..2 {
            let err = share
                .open("/s/a.txt", OpenMode::Read, &creds())
                .await
                .unwrap_err();
            assert_eq!(err.kind, TransportErrorKind::Locked);
        }
        assert!(share.open("/s/a.txt", OpenMode::Read, &creds()).await.is_ok());
        assert_eq!(share.open_calls(), 3);
    }

    #[tokio::test]
    async fn test_sticky_failure() {
        let share = MockShare::new().with_file("/s/a.txt", "x");
        share.fail_always("/s/a.txt", TransportError::auth("logon failure"));
        for _ in 0..3 {
            let err = share
                .open("/s/a.txt", OpenMode::Read, &creds())
                .await
                .unwrap_err();
            assert_eq!(err.kind, TransportErrorKind::Auth);
        }
        share.clear_failures("/s/a.txt");
        assert!(share.open("/s/a.txt", OpenMode::Read, &creds()).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_creates_file() {
        let share = MockShare::new();
        let mut file = share
            .open("/s/new.txt", OpenMode::Write, &creds())
            .await
            .unwrap();
        file.write_all(b"content").await.unwrap();
        assert_eq!(share.file_text("/s/new.txt").as_deref(), Some("content"));
        assert_eq!(share.write_count(), 1);
    }

    #[tokio::test]
    async fn test_write_on_read_handle_fails() {
        let share = MockShare::new().with_file("/s/a.txt", "x");
        let mut file = share
            .open("/s/a.txt", OpenMode::Read, &creds())
            .await
            .unwrap();
        assert!(file.write_all(b"y").await.is_err());
        assert_eq!(share.file_text("/s/a.txt").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_list_dirs_direct_children() {
        let share = MockShare::new()
            .with_file("/v/Kategorie_A/uebersicht.txt", "")
            .with_file("/v/Kategorie_B/deep/x.txt", "")
            .with_dir("/v/Other");

        let dirs = share.list_dirs("/v", &creds()).await.unwrap();
        assert_eq!(dirs, vec!["Kategorie_A", "Kategorie_B", "Other"]);
        assert_eq!(share.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_not_found() {
        let share = MockShare::new();
        let err = share.list_dirs("/nowhere", &creds()).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::NotFound);
    }
}
