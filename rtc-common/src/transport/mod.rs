//! Share transport abstraction.
//!
//! A [`ShareTransport`] performs a single protocol call against the file
//! share; it never retries and never consults host availability. Retry and
//! gating live in [`RemoteFileClient`](crate::client::RemoteFileClient).

pub mod fs;

use std::future::Future;

use crate::error::TransportError;
use crate::types::{Credentials, OpenMode};

pub use fs::MountedShare;

/// An open remote file.
pub trait RemoteFile: Send {
    /// Read the whole file.
    fn read_all(&mut self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Replace the file content.
    fn write_all(&mut self, contents: &[u8])
    -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// One protocol attempt against the file share.
pub trait ShareTransport: Send + Sync {
    type File: RemoteFile;

    /// Open `path` in the given mode using the supplied credentials.
    fn open(
        &self,
        path: &str,
        mode: OpenMode,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::File, TransportError>> + Send;

    /// Names of the direct subdirectories of `path`.
    fn list_dirs(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Vec<String>, TransportError>> + Send;

    /// Whether a file or directory exists at `path`.
    fn exists(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;
}
