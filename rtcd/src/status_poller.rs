//! Periodic traffic-light polling of tracked hosts.
//!
//! Every tick probes each tracked host, records the mapped availability in
//! the shared registry and publishes a `host_status` event. A black result
//! demotes the host to Offline and drops it from the tracking set until it
//! is tracked again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rtc_common::{HostAvailabilityRegistry, HostId, ShareTransport, TrafficLight};
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::probe::TrafficLightProbe;

/// Status poller over the current set of tracked hosts.
pub struct StatusPoller<T> {
    probe: Arc<TrafficLightProbe<T>>,
    registry: HostAvailabilityRegistry,
    tracked: Arc<RwLock<BTreeSet<HostId>>>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
    events: EventBus,
}

impl<T> Clone for StatusPoller<T> {
    fn clone(&self) -> Self {
        Self {
            probe: self.probe.clone(),
            registry: self.registry.clone(),
            tracked: self.tracked.clone(),
            interval: self.interval,
            running: self.running.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: ShareTransport + 'static> StatusPoller<T> {
    pub fn new(probe: TrafficLightProbe<T>, interval: Duration, events: EventBus) -> Self {
        let registry = probe.scanner().client().registry().clone();
        Self {
            probe: Arc::new(probe),
            registry,
            tracked: Arc::new(RwLock::new(BTreeSet::new())),
            interval,
            running: Arc::new(RwLock::new(false)),
            events,
        }
    }

    /// Start tracking `host`. Any previous availability is forgotten so the
    /// first probe is not short-circuited by a stale Offline entry.
    pub async fn track(&self, host: HostId) {
        self.registry.remove(&host).await;
        if self.tracked.write().await.insert(host.clone()) {
            info!(host = %host, "Tracking host");
        }
    }

    pub async fn untrack(&self, host: &HostId) -> bool {
        self.tracked.write().await.remove(host)
    }

    pub async fn tracked_hosts(&self) -> Vec<HostId> {
        self.tracked.read().await.iter().cloned().collect()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Probe every tracked host once.
    pub async fn poll_once(&self) -> Vec<(HostId, TrafficLight)> {
        let hosts = self.tracked_hosts().await;
        debug!("Polling status of {} hosts", hosts.len());

        let mut results = Vec::with_capacity(hosts.len());
        for host in hosts {
            let light = self.probe.probe(&host).await;
            let previous = self.registry.get_status(&host).await;
            self.registry.set_status(&host, light.availability()).await;
            self.events.host_status(&host, light);

            if light == TrafficLight::Black {
                self.untrack(&host).await;
                warn!(host = %host, "Host unreachable, demoted to offline and no longer polled");
            } else if previous != Some(light.availability()) {
                debug!(host = %host, status = %light, "Host status changed");
            }
            results.push((host, light));
        }
        results
    }

    /// Start the polling background task.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            *poller.running.write().await = true;
            let mut ticker = interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Status poller started (interval: {:?})", poller.interval);

            loop {
                ticker.tick().await;

                if !*poller.running.read().await {
                    info!("Status poller stopping");
                    break;
                }
                poller.poll_once().await;
            }
        })
    }

    /// Stop the polling loop; it exits at its next tick.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, HOST};
    use rtc_common::{AvailabilityState, MockShare, RetryPolicy};

    const MARKER: &str = r"\\masch1\c$\Testsystem\aktiv";

    fn poller(share: &MockShare) -> StatusPoller<MockShare> {
        let probe = TrafficLightProbe::new(test_support::scanner(share), r"\\{host}\c$\Testsystem\aktiv")
            .with_policy(RetryPolicy::fixed(3, Duration::from_secs(1)));
        StatusPoller::new(probe, Duration::from_secs(10), EventBus::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_records_availability() {
        let share = test_support::host_share("Start TF: A (1 von 2)\n.F. Fehler\nEnde  TF: A\n");
        share.insert_file(MARKER, "");
        let poller = poller(&share);
        let host = HostId::new(HOST);
        poller.track(host.clone()).await;

        let results = poller.poll_once().await;
        assert_eq!(results, vec![(host.clone(), TrafficLight::Red)]);
        assert_eq!(
            poller.registry.get_status(&host).await,
            Some(AvailabilityState::Error)
        );
        assert_eq!(poller.tracked_hosts().await, vec![host]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_black_demotes_and_untracks() {
        let share = MockShare::new();
        let poller = poller(&share);
        let host = HostId::new(HOST);
        poller.track(host.clone()).await;

        let mut rx = poller.events.subscribe();
        let results = poller.poll_once().await;
        assert_eq!(results, vec![(host.clone(), TrafficLight::Black)]);
        assert_eq!(
            poller.registry.get_status(&host).await,
            Some(AvailabilityState::Offline)
        );
        assert!(poller.tracked_hosts().await.is_empty());

        let event: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["data"]["status"], "black");

        // No further polling until re-added.
        let calls = share.total_calls();
        assert!(poller.poll_once().await.is_empty());
        assert_eq!(share.total_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_version_keeps_host_tracked() {
        let share = test_support::host_share("");
        let mut log: Vec<String> = (1..=7).map(|n| format!("Zeile {n}")).collect();
        log.push(r"Installiert: \\fileserver\ergebnis\Basis\03-2024\V1\masch1\".into());
        share.insert_file(test_support::SYSTEM_LOG, log.join("\r\n"));
        let poller = poller(&share);
        let host = HostId::new(HOST);
        poller.track(host.clone()).await;

        assert_eq!(
            poller.poll_once().await,
            vec![(host.clone(), TrafficLight::Orange)]
        );
        assert_eq!(
            poller.registry.get_status(&host).await,
            Some(AvailabilityState::Online)
        );
        assert_eq!(poller.tracked_hosts().await, vec![host]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_clears_stale_offline_state() {
        let share = test_support::host_share("");
        let poller = poller(&share);
        let host = HostId::new(HOST);
        poller
            .registry
            .set_status(&host, AvailabilityState::Offline)
            .await;

        poller.track(host.clone()).await;
        assert_eq!(poller.registry.get_status(&host).await, None);
        assert_eq!(
            poller.poll_once().await,
            vec![(host.clone(), TrafficLight::Orange)]
        );
        assert_eq!(
            poller.registry.get_status(&host).await,
            Some(AvailabilityState::Online)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_polls_on_cadence_and_stops() {
        let share = test_support::host_share("");
        let poller = poller(&share);
        poller.track(HostId::new(HOST)).await;

        let handle = poller.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(poller.is_running().await);
        let first = share.total_calls();
        assert!(first > 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = share.total_calls();
        assert!(second > first);

        poller.stop().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.await.unwrap();
        assert_eq!(share.total_calls(), second);
    }
}
