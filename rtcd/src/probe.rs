//! Host probes: the "free to touch" status file and the traffic light.

use std::future::Future;

use rtc_common::config::{PathVars, join, render};
use rtc_common::{
    Access, FaultOverviewScanner, HostId, RemoteError, RemoteFileClient, RetryPolicy,
    RetryableError, ScanError, ShareTransport, TrafficLight, run_with_retry,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Content of a status file that marks the host as free.
const FREE_MARKER: &str = "n";

/// Whether a host may currently be touched by a progress tick.
pub trait BusyProbe: Send + Sync {
    fn is_free(&self, host: &HostId) -> impl Future<Output = bool> + Send;
}

/// Reads `<dir>/<host>work.txt`; the host is free iff it holds `n`.
pub struct StatusFileProbe<T> {
    client: RemoteFileClient<T>,
    dir: String,
}

impl<T: ShareTransport> StatusFileProbe<T> {
    pub fn new(client: &RemoteFileClient<T>, dir: impl Into<String>) -> Self {
        Self {
            client: client.with_policy(RetryPolicy::once()),
            dir: dir.into(),
        }
    }

    pub fn status_path(&self, host: &HostId) -> String {
        join(&self.dir, &format!("{host}work.txt"))
    }
}

impl<T: ShareTransport> BusyProbe for StatusFileProbe<T> {
    async fn is_free(&self, host: &HostId) -> bool {
        let path = self.status_path(host);
        match self.client.read_text(Access::session(), &path).await {
            Ok(file) => file.text.trim() == FREE_MARKER,
            Err(err) => {
                warn!(host = %host, path, "Could not read busy status: {}", err);
                false
            }
        }
    }
}

/// A probe attempt failed after the overview scan succeeded.
#[derive(Debug, Error)]
#[error("status probe failed: {0}")]
pub struct ProbeError(#[from] RemoteError);

impl RetryableError for ProbeError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Classifies a host as green, orange, red or black.
pub struct TrafficLightProbe<T> {
    scanner: FaultOverviewScanner<T>,
    activity_marker: String,
    policy: RetryPolicy,
}

impl<T: ShareTransport> TrafficLightProbe<T> {
    pub fn new(scanner: FaultOverviewScanner<T>, activity_marker: impl Into<String>) -> Self {
        Self {
            scanner,
            activity_marker: activity_marker.into(),
            policy: RetryPolicy::status_probe(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn scanner(&self) -> &FaultOverviewScanner<T> {
        &self.scanner
    }

    /// One classification attempt.
    ///
    /// A host whose logs cannot be reached is black right away. A system
    /// log without a readable version leaves the host reachable with no
    /// known errors. Only the activity check can fail the attempt; it is
    /// tried once, retries happen in [`Self::probe`].
    pub async fn probe_once(&self, host: &HostId) -> Result<TrafficLight, ProbeError> {
        let informational = &self.scanner.settings().informational_pattern;
        let blocking = match self.scanner.read_overview(host).await {
            Ok(entry) => entry.blocking_count(informational),
            Err(ScanError::Remote(err)) => {
                debug!(host = %host, "Host not accessible: {}", err);
                return Ok(TrafficLight::Black);
            }
            Err(ScanError::Parse(err)) => {
                warn!(host = %host, "Installed version unknown, no errors counted: {}", err);
                0
            }
        };

        let marker = render(&self.activity_marker, &PathVars::host(host.as_str()));
        let running = self
            .scanner
            .client()
            .with_policy(RetryPolicy::once())
            .exists(Access::vm(host), &marker)
            .await?;
        Ok(TrafficLight::classify(true, running, blocking))
    }

    /// Classify with the status-probe retry envelope; black when every
    /// attempt failed.
    pub async fn probe(&self, host: &HostId) -> TrafficLight {
        match run_with_retry("status probe", &self.policy, || self.probe_once(host)).await {
            Ok(done) => done.value,
            Err(failed) => {
                warn!(host = %host, attempts = failed.attempts, "Status probe gave up: {}", failed.value);
                TrafficLight::Black
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, HOST, VERSION_DIR};
    use rtc_common::{MockShare, TransportError};
    use std::time::Duration;

    const BUSY_DIR: &str = r"\\fileserver\regression\timecontrol";
    const MARKER: &str = r"\\masch1\c$\Testsystem\aktiv";

    fn busy_probe(share: &MockShare) -> StatusFileProbe<MockShare> {
        StatusFileProbe::new(&test_support::client(share), BUSY_DIR)
    }

    fn light_probe(share: &MockShare) -> TrafficLightProbe<MockShare> {
        TrafficLightProbe::new(test_support::scanner(share), r"\\{host}\c$\Testsystem\aktiv")
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_file_free_marker() {
        let share = MockShare::new()
            .with_file(&format!(r"{BUSY_DIR}\masch1work.txt"), " n\r\n")
            .with_file(&format!(r"{BUSY_DIR}\masch2work.txt"), "j");
        let probe = busy_probe(&share);

        assert!(probe.is_free(&HostId::new("masch1")).await);
        assert!(!probe.is_free(&HostId::new("masch2")).await);
        assert!(!probe.is_free(&HostId::new("masch3")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_file_read_is_not_retried() {
        let share = MockShare::new();
        let path = format!(r"{BUSY_DIR}\masch1work.txt");
        share.insert_file(&path, "n");
        share.fail_always(&path, TransportError::locked("busy"));
        let probe = busy_probe(&share);

        assert!(!probe.is_free(&HostId::new("masch1")).await);
        assert_eq!(share.open_calls_for(&path), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_orange_when_idle() {
        let share = test_support::host_share("Start TF: A (1 von 2)\n.F. x\nEnde  TF: A\n");
        let light = light_probe(&share).probe(&HostId::new(HOST)).await;
        assert_eq!(light, TrafficLight::Orange);
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_green_and_red_when_running() {
        let share = test_support::host_share("Start TF: A (1 von 2)\n.H. nur Hinweis\nEnde  TF: A\n");
        share.insert_file(MARKER, "");
        let probe = light_probe(&share);
        let host = HostId::new(HOST);
        assert_eq!(probe.probe(&host).await, TrafficLight::Green);

        share.insert_file(
            &format!(r"{VERSION_DIR}\Kategorie_A\uebersicht.txt"),
            "Start TF: A (1 von 2)\n.F. Fehler\nEnde  TF: A\n",
        );
        assert_eq!(probe.probe(&host).await, TrafficLight::Red);
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_black_when_scan_fails() {
        let share = MockShare::new();
        let light = light_probe(&share).probe(&HostId::new(HOST)).await;
        assert_eq!(light, TrafficLight::Black);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_version_tag_is_not_black() {
        let share = test_support::host_share("Start TF: A (1 von 2)\n.F. x\nEnde  TF: A\n");
        let mut log: Vec<String> = (1..=7).map(|n| format!("Zeile {n}")).collect();
        log.push(r"Installiert: \\fileserver\ergebnis\Basis\03-2024\V1\masch1\".into());
        share.insert_file(test_support::SYSTEM_LOG, log.join("\r\n"));
        let probe = light_probe(&share);
        let host = HostId::new(HOST);

        assert_eq!(probe.probe(&host).await, TrafficLight::Orange);
        share.insert_file(MARKER, "");
        assert_eq!(probe.probe(&host).await, TrafficLight::Green);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_check_failures_are_retried_then_black() {
        let share = test_support::host_share("");
        share.fail_always(MARKER, TransportError::other("network name no longer available"));
        let probe = light_probe(&share);

        let start = tokio::time::Instant::now();
        assert_eq!(probe.probe(&HostId::new(HOST)).await, TrafficLight::Black);
        assert_eq!(start.elapsed(), Duration::from_secs(9));

        share.clear_failures(MARKER);
        share.fail_next(MARKER, TransportError::other("reset"));
        assert_eq!(probe.probe(&HostId::new(HOST)).await, TrafficLight::Orange);
    }
}
