//! Retrying remote file access.
//!
//! [`RemoteFileClient`] is the boundary where raw share failures become
//! [`RemoteError`] values. Every call:
//!
//! 1. consults the [`HostAvailabilityRegistry`] (unless the access is
//!    session-scoped) and fails with `Offline` without touching the share,
//! 2. runs the protocol step under the client's [`RetryPolicy`], retrying
//!    only lock violations,
//! 3. records the attempt count used for the path.
//!
//! Marking a host Offline after exhausted retries is the caller's decision.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::error::{RemoteError, TransportError};
use crate::registry::HostAvailabilityRegistry;
use crate::retry::{RetryPolicy, run_with_retry};
use crate::text::{self, TextEncoding};
use crate::transport::{RemoteFile, ShareTransport};
use crate::types::{AccessRole, CredentialSet, Credentials, HostId, OpenMode};

/// Who a remote access is for and under which account it runs.
#[derive(Debug, Clone, Copy)]
pub struct Access<'a> {
    host: Option<&'a HostId>,
    role: AccessRole,
}

impl<'a> Access<'a> {
    /// Per-VM account, gated by the host's availability.
    pub fn vm(host: &'a HostId) -> Self {
        Self {
            host: Some(host),
            role: AccessRole::VmUser,
        }
    }

    /// Network-share account, gated by the host's availability.
    pub fn network(host: &'a HostId) -> Self {
        Self {
            host: Some(host),
            role: AccessRole::NetworkUser,
        }
    }

    /// Network-share account for files that belong to no single host.
    pub fn session() -> Self {
        Self {
            host: None,
            role: AccessRole::Session,
        }
    }

    pub fn host(&self) -> Option<&'a HostId> {
        self.host
    }

    pub fn role(&self) -> AccessRole {
        self.role
    }
}

/// A successfully opened file plus diagnostics.
#[derive(Debug)]
pub struct Opened<F> {
    pub file: F,
    pub attempts: u32,
    pub waited: Duration,
}

/// Decoded content of a remote text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFile {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Remote file client with retry, backoff and availability gating.
pub struct RemoteFileClient<T> {
    transport: Arc<T>,
    registry: HostAvailabilityRegistry,
    credentials: Arc<CredentialSet>,
    policy: RetryPolicy,
    attempt_log: Arc<Mutex<HashMap<String, u32>>>,
}

impl<T> Clone for RemoteFileClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            credentials: self.credentials.clone(),
            policy: self.policy.clone(),
            attempt_log: self.attempt_log.clone(),
        }
    }
}

impl<T: ShareTransport> RemoteFileClient<T> {
    /// Create a client using the file-open retry preset.
    pub fn new(transport: T, registry: HostAvailabilityRegistry, credentials: CredentialSet) -> Self {
        Self {
            transport: Arc::new(transport),
            registry,
            credentials: Arc::new(credentials),
            policy: RetryPolicy::file_open(),
            attempt_log: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A client sharing transport, registry and credentials but retrying
    /// with a different policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &HostAvailabilityRegistry {
        &self.registry
    }

    /// Attempts used by the last successful or failed call on `path`.
    pub fn last_attempts(&self, path: &str) -> Option<u32> {
        self.attempt_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .copied()
    }

    // ── Operations ─────────────────────────────────────────────────────

    /// Open a remote file.
    pub async fn open(
        &self,
        access: Access<'_>,
        path: &str,
        mode: OpenMode,
    ) -> Result<Opened<T::File>, RemoteError> {
        let transport = &*self.transport;
        let credentials = self.credentials.for_role(access.role);
        let (file, attempts, waited) = self
            .attempt(access, path, "open", move || {
                transport.open(path, mode, credentials)
            })
            .await?;
        Ok(Opened {
            file,
            attempts,
            waited,
        })
    }

    /// Open and read a text file in one retried step.
    pub async fn read_text(&self, access: Access<'_>, path: &str) -> Result<TextFile, RemoteError> {
        let transport = &*self.transport;
        let credentials = self.credentials.for_role(access.role);
        let (bytes, _, _) = self
            .attempt(access, path, "read", move || {
                read_once(transport, path, credentials)
            })
            .await?;
        let (text, encoding) = text::decode(&bytes);
        Ok(TextFile { text, encoding })
    }

    /// Replace a text file's content in one retried step.
    pub async fn write_text(
        &self,
        access: Access<'_>,
        path: &str,
        text: &str,
        encoding: TextEncoding,
    ) -> Result<(), RemoteError> {
        let transport = &*self.transport;
        let credentials = self.credentials.for_role(access.role);
        let bytes = text::encode(text, encoding);
        let bytes = bytes.as_slice();
        self.attempt(access, path, "write", move || {
            write_once(transport, path, credentials, bytes)
        })
        .await?;
        Ok(())
    }

    /// Names of the direct subdirectories of `path`.
    pub async fn list_dirs(&self, access: Access<'_>, path: &str) -> Result<Vec<String>, RemoteError> {
        let transport = &*self.transport;
        let credentials = self.credentials.for_role(access.role);
        let (dirs, _, _) = self
            .attempt(access, path, "list", move || {
                transport.list_dirs(path, credentials)
            })
            .await?;
        Ok(dirs)
    }

    /// Whether `path` exists on the share.
    pub async fn exists(&self, access: Access<'_>, path: &str) -> Result<bool, RemoteError> {
        let transport = &*self.transport;
        let credentials = self.credentials.for_role(access.role);
        let (exists, _, _) = self
            .attempt(access, path, "exists", move || {
                transport.exists(path, credentials)
            })
            .await?;
        Ok(exists)
    }

    async fn attempt<F, Fut, R>(
        &self,
        access: Access<'_>,
        path: &str,
        operation: &str,
        op: F,
    ) -> Result<(R, u32, Duration), RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        if let Some(host) = access.host
            && self.registry.is_offline(host).await
        {
            debug!(host = %host, path, operation, "Host offline, skipping remote access");
            return Err(RemoteError::Offline { host: host.clone() });
        }

        let result = run_with_retry(operation, &self.policy, op).await;
        let attempts = match &result {
            Ok(done) => done.attempts,
            Err(failed) => failed.attempts,
        };
        self.attempt_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), attempts);

        match result {
            Ok(done) => {
                if done.attempts > 1 {
                    debug!(path, operation, attempts = done.attempts, "Remote access succeeded after retries");
                }
                Ok((done.value, done.attempts, done.waited))
            }
            Err(failed) => {
                let err = failed.value.into_remote(path, failed.attempts);
                debug!(path, operation, attempts = failed.attempts, "Remote access failed: {}", err);
                Err(err)
            }
        }
    }
}

async fn read_once<T: ShareTransport>(
    transport: &T,
    path: &str,
    credentials: &Credentials,
) -> Result<Vec<u8>, TransportError> {
    let mut file = transport.open(path, OpenMode::Read, credentials).await?;
    file.read_all().await
}

async fn write_once<T: ShareTransport>(
    transport: &T,
    path: &str,
    credentials: &Credentials,
    bytes: &[u8],
) -> Result<(), TransportError> {
    let mut file = transport.open(path, OpenMode::Write, credentials).await?;
    file.write_all(bytes).await
}
