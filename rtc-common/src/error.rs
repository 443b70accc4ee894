//! Error taxonomy for remote access, editing and scanning.
//!
//! Low-level share failures arrive as [`TransportError`] and are converted
//! into [`RemoteError`] at the [`RemoteFileClient`](crate::client::RemoteFileClient)
//! boundary. Everything above that boundary branches on these values.

use thiserror::Error;

use crate::retry::RetryableError;
use crate::types::HostId;

/// Classified failure reported by a share transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Logon failure or access denied.
    Auth,
    /// Sharing/lock violation ("used by another process").
    Locked,
    /// File or directory does not exist.
    NotFound,
    /// Anything not recognised as one of the above.
    Other,
}

/// Raw protocol failure from a [`ShareTransport`](crate::transport::ShareTransport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Auth, message)
    }

    pub fn locked(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Locked, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Convert into the public taxonomy, attaching the path and attempt count.
    pub fn into_remote(self, path: &str, attempts: u32) -> RemoteError {
        match self.kind {
            TransportErrorKind::Auth => RemoteError::Auth {
                path: path.to_string(),
                message: self.message,
            },
            TransportErrorKind::Locked => RemoteError::Locked {
                path: path.to_string(),
                attempts,
            },
            TransportErrorKind::NotFound => RemoteError::NotFound {
                path: path.to_string(),
            },
            TransportErrorKind::Other => RemoteError::Io {
                path: path.to_string(),
                message: self.message,
            },
        }
    }
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        self.kind == TransportErrorKind::Locked
    }
}

/// Failure of a remote file operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Host is recorded as Offline; no I/O was attempted.
    #[error("host {host} is offline")]
    Offline { host: HostId },

    /// Credentials were rejected.
    #[error("authentication failed for {path}: {message}")]
    Auth { path: String, message: String },

    /// Still locked by another process after all attempts.
    #[error("{path} is locked by another process (gave up after {attempts} attempts)")]
    Locked { path: String, attempts: u32 },

    /// File or directory does not exist.
    #[error("{path} not found")]
    NotFound { path: String },

    /// Any other protocol failure.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl RemoteError {
    /// Short machine-friendly name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offline { .. } => "offline",
            Self::Auth { .. } => "auth",
            Self::Locked { .. } => "locked",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
        }
    }
}

impl RetryableError for RemoteError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// A read failure that may clear up on its own.
///
/// Retries every [`RemoteError`] except `Offline` and `Auth`: an overview
/// file being rewritten can briefly vanish or fail mid-read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(transparent)]
pub struct TransientReadError(#[from] pub RemoteError);

impl RetryableError for TransientReadError {
    fn is_retryable(&self) -> bool {
        !matches!(self.0, RemoteError::Offline { .. } | RemoteError::Auth { .. })
    }
}

/// An expected pattern was absent from a version, date or count line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line} not present ({available} lines available)")]
    MissingLine { line: usize, available: usize },

    #[error("no version tag (LF, LT or LFREF) in line: {line}")]
    NoVersionTag { line: String },

    #[error("no module/date segment in line: {line}")]
    NoModuleSegment { line: String },

    #[error("invalid {what}: '{value}'")]
    InvalidValue { what: &'static str, value: String },
}

/// Failure of a config-line edit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    /// The read (or write) of the remote file failed; nothing was written.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Replacement value does not fit the field.
    #[error("invalid value '{value}' for {field}: expected {expected}")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The file's encoding cannot store a character of the new value.
    #[error("value '{value}' for {field} contains '{character}', which the file's {encoding} encoding cannot store")]
    Unencodable {
        field: &'static str,
        value: String,
        character: char,
        encoding: &'static str,
    },

    /// A database line references a `.mdb` name whose year width is unknown.
    #[error("unrecognised database file name in line {line_number}: {line}")]
    UnrecognisedDatabaseName { line_number: usize, line: String },
}

/// Failure of an overview scan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
