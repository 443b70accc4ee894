//! Shared types and remote access for Regression Test Control (RTC).
//!
//! The crate covers everything that talks to the test machines' shares:
//! retrying file access gated by host availability, regex-anchored edits of
//! configuration files, overview/system log scanning and progress
//! evaluation. The `rtcd` daemon drives these from its polling loops.

pub mod categories;
pub mod client;
pub mod config;
pub mod counts;
pub mod editor;
pub mod error;
pub mod mock;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod scan;
pub mod text;
pub mod transport;
pub mod types;

pub use categories::{CategoryCatalog, parse_category_declaration};
pub use client::{Access, Opened, RemoteFileClient, TextFile};
pub use config::{ConfigError, EnvParser, RtcConfig, WatchMode};
pub use counts::{CountSource, JsonCountSource};
pub use editor::{
    ConfigDocument, ConfigField, ConfigLineEditor, ControllingEdit, ControllingReport,
    ControllingSnapshot, EditOutcome,
};
pub use error::{
    EditError, ParseError, RemoteError, ScanError, TransientReadError, TransportError,
    TransportErrorKind,
};
pub use mock::{FixedCounts, MockShare};
pub use progress::{
    CategoryProgress, PollPhase, PollState, ProgressStatus, ProgressTracker, evaluate,
};
pub use registry::HostAvailabilityRegistry;
pub use retry::{Attempted, RetryPolicy, RetryableError, run_with_retry};
pub use scan::{
    CategoryErrorIndex, CategoryErrors, FaultOverviewScanner, HostErrorIndex, ScanSettings,
    SystemVersion,
};
pub use text::TextEncoding;
pub use transport::{MountedShare, RemoteFile, ShareTransport};
pub use types::{
    AccessRole, AvailabilityState, CredentialSet, Credentials, HostId, OpenMode, TrafficLight,
};
