//! Common types used across RTC components.

use serde::{Deserialize, Serialize};

/// Identifier of a remote machine under test (e.g. `masch3`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Last known availability of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    /// Reachable and idle.
    Online,
    /// Unreachable; remote access short-circuits until the host is probed again.
    Offline,
    /// Reachable, tests running with blocking errors.
    Error,
    /// Reachable, tests running.
    Running,
}

impl std::fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
            Self::Error => write!(f, "Error"),
            Self::Running => write!(f, "Running"),
        }
    }
}

/// How a remote file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    Read,
    Write,
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Which account a remote access runs under.
///
/// `Session` is reserved for the shared controlling state (and other files
/// that do not belong to a single host); it bypasses host availability gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    /// Per-VM local account.
    VmUser,
    /// Account for the central network share.
    NetworkUser,
    /// Network account, not gated by host availability.
    Session,
}

/// Username/password pair handed through to the share transport.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Credentials per network role.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    pub network: Credentials,
    pub vm: Credentials,
}

impl CredentialSet {
    /// Credentials used for the given role.
    pub fn for_role(&self, role: AccessRole) -> &Credentials {
        match role {
            AccessRole::VmUser => &self.vm,
            AccessRole::NetworkUser | AccessRole::Session => &self.network,
        }
    }
}

/// Traffic-light status surfaced for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLight {
    /// Tests running, no blocking errors.
    Green,
    /// Idle / not running.
    Orange,
    /// Running with at least one non-informational error.
    Red,
    /// Unreachable.
    Black,
}

impl TrafficLight {
    /// Classify a host from the facts a status probe gathered.
    pub fn classify(accessible: bool, running: bool, blocking_errors: usize) -> Self {
        if !accessible {
            Self::Black
        } else if running && blocking_errors > 0 {
            Self::Red
        } else if running {
            Self::Green
        } else {
            Self::Orange
        }
    }

    /// Registry state this light maps to.
    pub fn availability(self) -> AvailabilityState {
        match self {
            Self::Green => AvailabilityState::Running,
            Self::Red => AvailabilityState::Error,
            Self::Orange => AvailabilityState::Online,
            Self::Black => AvailabilityState::Offline,
        }
    }
}

impl std::fmt::Display for TrafficLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Orange => write!(f, "orange"),
            Self::Red => write!(f, "red"),
            Self::Black => write!(f, "black"),
        }
    }
}
