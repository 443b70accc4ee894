//! Process-wide host availability registry.
//!
//! Single source of truth for the last known [`AvailabilityState`] of every
//! host. The registry is a cheap-to-clone handle; clones share the same map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::types::{AvailabilityState, HostId};

/// Keyed store of host availability.
///
/// A host absent from the registry is unknown and remote access proceeds.
/// A host recorded as [`AvailabilityState::Offline`] short-circuits remote
/// access until a fresh probe overwrites the entry.
#[derive(Debug, Clone, Default)]
pub struct HostAvailabilityRegistry {
    states: Arc<RwLock<HashMap<HostId, AvailabilityState>>>,
}

impl HostAvailabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded state, `None` when the host is unknown.
    pub async fn get_status(&self, host: &HostId) -> Option<AvailabilityState> {
        self.states.read().await.get(host).copied()
    }

    /// Record a state, logging the transition.
    pub async fn set_status(&self, host: &HostId, state: AvailabilityState) {
        let previous = self.states.write().await.insert(host.clone(), state);
        match previous {
            Some(prev) if prev == state => {}
            Some(prev) => info!(host = %host, "Host status {} -> {}", prev, state),
            None => info!(host = %host, "Host status set to {}", state),
        }
    }

    /// Drop tracking for a host entirely.
    pub async fn remove(&self, host: &HostId) -> Option<AvailabilityState> {
        let removed = self.states.write().await.remove(host);
        if removed.is_some() {
            info!(host = %host, "Host removed from availability registry");
        }
        removed
    }

    /// Whether remote access to the host must be short-circuited.
    pub async fn is_offline(&self, host: &HostId) -> bool {
        self.get_status(host).await == Some(AvailabilityState::Offline)
    }

    /// Snapshot of all entries, sorted by host.
    pub async fn snapshot(&self) -> Vec<(HostId, AvailabilityState)> {
        let mut entries: Vec<_> = self
            .states
            .read()
            .await
            .iter()
            .map(|(host, state)| (host.clone(), *state))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_host_has_no_status() {
        let registry = HostAvailabilityRegistry::new();
        let host = HostId::new("masch1");
        assert_eq!(registry.get_status(&host).await, None);
        assert!(!registry.is_offline(&host).await);
    }

    #[tokio::test]
    async fn test_set_status_overwrites() {
        let registry = HostAvailabilityRegistry::new();
        let host = HostId::new("masch1");

        registry.set_status(&host, AvailabilityState::Online).await;
        registry.set_status(&host, AvailabilityState::Offline).await;

        assert_eq!(
            registry.get_status(&host).await,
            Some(AvailabilityState::Offline)
        );
        assert!(registry.is_offline(&host).await);
    }

    #[tokio::test]
    async fn test_remove_returns_to_unknown() {
        let registry = HostAvailabilityRegistry::new();
        let host = HostId::new("masch2");

        registry.set_status(&host, AvailabilityState::Running).await;
        assert_eq!(
            registry.remove(&host).await,
            Some(AvailabilityState::Running)
        );
        assert_eq!(registry.get_status(&host).await, None);
        assert_eq!(registry.remove(&host).await, None);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = HostAvailabilityRegistry::new();
        let clone = registry.clone();
        let host = HostId::new("masch3");

        clone.set_status(&host, AvailabilityState::Error).await;
        assert_eq!(
            registry.get_status(&host).await,
            Some(AvailabilityState::Error)
        );
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let registry = HostAvailabilityRegistry::new();
        registry
            .set_status(&HostId::new("masch9"), AvailabilityState::Online)
            .await;
        registry
            .set_status(&HostId::new("masch1"), AvailabilityState::Offline)
            .await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].0.as_str(), "masch1");
        assert_eq!(snapshot[1].0.as_str(), "masch9");
    }
}
