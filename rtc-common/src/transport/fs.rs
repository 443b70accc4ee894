//! Share transport over the local filesystem API.
//!
//! Works for UNC paths (`\\host\share\...`) on Windows and for SMB shares
//! mounted into the local tree elsewhere. Authentication is done by the OS
//! session that mounted the share, so the supplied credentials are only
//! recorded in traces.

use std::io;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::trace;

use super::{RemoteFile, ShareTransport};
use crate::error::{TransportError, TransportErrorKind};
use crate::types::{Credentials, OpenMode};

/// Windows: `ERROR_SHARING_VIOLATION`.
const ERROR_SHARING_VIOLATION: i32 = 32;
/// Windows: `ERROR_LOCK_VIOLATION`.
const ERROR_LOCK_VIOLATION: i32 = 33;
/// Windows: `ERROR_LOGON_FAILURE`.
const ERROR_LOGON_FAILURE: i32 = 1326;

/// Share mounted into (or reachable through) the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct MountedShare;

impl MountedShare {
    pub fn new() -> Self {
        Self
    }
}

/// Open file on a mounted share.
#[derive(Debug)]
pub struct MountedFile {
    path: String,
    file: tokio::fs::File,
}

impl RemoteFile for MountedFile {
    async fn read_all(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        self.file
            .read_to_end(&mut buf)
            .await
            .map_err(|e| classify(&self.path, &e))?;
        Ok(buf)
    }

    async fn write_all(&mut self, contents: &[u8]) -> Result<(), TransportError> {
        self.file
            .set_len(0)
            .await
            .map_err(|e| classify(&self.path, &e))?;
        self.file
            .rewind()
            .await
            .map_err(|e| classify(&self.path, &e))?;
        self.file
            .write_all(contents)
            .await
            .map_err(|e| classify(&self.path, &e))?;
        self.file
            .flush()
            .await
            .map_err(|e| classify(&self.path, &e))
    }
}

impl ShareTransport for MountedShare {
    type File = MountedFile;

    async fn open(
        &self,
        path: &str,
        mode: OpenMode,
        credentials: &Credentials,
    ) -> Result<MountedFile, TransportError> {
        trace!(path, %mode, user = %credentials.username, "Opening share file");
        let mut options = tokio::fs::OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true),
        };
        let file = options.open(path).await.map_err(|e| classify(path, &e))?;
        Ok(MountedFile {
            path: path.to_string(),
            file,
        })
    }

    async fn list_dirs(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<Vec<String>, TransportError> {
        trace!(path, user = %credentials.username, "Listing share directory");
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| classify(path, &e))?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| classify(path, &e))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn exists(&self, path: &str, credentials: &Credentials) -> Result<bool, TransportError> {
        trace!(path, user = %credentials.username, "Checking share path");
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| classify(path, &e))
    }
}

/// Map an OS error onto the transport taxonomy.
pub fn classify_io_error(err: &io::Error) -> TransportErrorKind {
    match err.raw_os_error() {
        Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION) if cfg!(windows) => {
            return TransportErrorKind::Locked;
        }
        Some(ERROR_LOGON_FAILURE) if cfg!(windows) => return TransportErrorKind::Auth,
        _ => {}
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => TransportErrorKind::Auth,
        io::ErrorKind::NotFound => TransportErrorKind::NotFound,
        io::ErrorKind::ResourceBusy => TransportErrorKind::Locked,
        _ if err.to_string().contains("used by another process") => TransportErrorKind::Locked,
        _ => TransportErrorKind::Other,
    }
}

fn classify(path: &str, err: &io::Error) -> TransportError {
    TransportError::new(classify_io_error(err), format!("{path}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn creds() -> Credentials {
        Credentials::new("tester", "secret")
    }

    #[test]
    fn test_classify_io_error_kinds() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        assert_eq!(classify_io_error(&denied), TransportErrorKind::Auth);

        let missing = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert_eq!(classify_io_error(&missing), TransportErrorKind::NotFound);

        let busy = io::Error::other(
            "The process cannot access the file because it is being used by another process.",
        );
        assert_eq!(classify_io_error(&busy), TransportErrorKind::Locked);

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(classify_io_error(&reset), TransportErrorKind::Other);
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TestConfig.ini");
        let path = path.to_str().unwrap();
        let share = MountedShare::new();

        let mut file = share.open(path, OpenMode::Write, &creds()).await.unwrap();
        file.write_all(b"praefix = \"A\"\r\n").await.unwrap();
        drop(file);

        let mut file = share.open(path, OpenMode::Read, &creds()).await.unwrap();
        assert_eq!(file.read_all().await.unwrap(), b"praefix = \"A\"\r\n");
    }

    #[tokio::test]
    async fn test_write_truncates_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.txt");
        std::fs::write(&path, "a much longer previous content\n").unwrap();
        let path = path.to_str().unwrap();
        let share = MountedShare::new();

        let mut file = share.open(path, OpenMode::Write, &creds()).await.unwrap();
        file.write_all(b"short\n").await.unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(path).unwrap(), "short\n");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.txt");
        let err = MountedShare::new()
            .open(path.to_str().unwrap(), OpenMode::Read, &creds())
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_dirs_only_returns_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Kategorie_B")).unwrap();
        std::fs::create_dir(dir.path().join("Kategorie_A")).unwrap();
        std::fs::write(dir.path().join("uebersicht.txt"), "").unwrap();

        let dirs = MountedShare::new()
            .list_dirs(dir.path().to_str().unwrap(), &creds())
            .await
            .unwrap();
        assert_eq!(dirs, vec!["Kategorie_A", "Kategorie_B"]);
    }

    #[tokio::test]
    async fn test_exists() {
        let dir = TempDir::new().unwrap();
        let share = MountedShare::new();
        assert!(
            share
                .exists(dir.path().to_str().unwrap(), &creds())
                .await
                .unwrap()
        );
        let missing = dir.path().join("nope");
        assert!(
            !share
                .exists(missing.to_str().unwrap(), &creds())
                .await
                .unwrap()
        );
    }
}
