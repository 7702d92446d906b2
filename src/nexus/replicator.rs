//! Periodic push of the root key to every Keeper.
//!
//! Best-effort eventual replication: each tick reads the store's current
//! value and pushes it to all Keepers concurrently. A failing Keeper is logged
//! and retried on the next tick; it never fails the tick for the others.

use crate::nexus::keeper_client::{KeeperChannel, KeeperClientError};
use crate::nexus::registry::{KeeperEndpoint, KeeperRegistry};
use crate::nexus::store::RootKeyStore;
use crate::key::VersionedRootKey;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one replication tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// True when the store held no key and nothing was pushed
    pub skipped: bool,
    pub pushed: usize,
    pub failed: usize,
}

pub struct Replicator {
    store: Arc<RootKeyStore>,
    registry: Arc<KeeperRegistry>,
    channel: Arc<dyn KeeperChannel>,
    interval: Duration,
    call_timeout: Duration,
    wake: Notify,
    /// Serializes ticks, whether timer-driven or called directly.
    tick_lock: Mutex<()>,
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("keepers", &self.registry.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Replicator {
    pub fn new(
        store: Arc<RootKeyStore>,
        registry: Arc<KeeperRegistry>,
        channel: Arc<dyn KeeperChannel>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            channel,
            interval,
            call_timeout,
            wake: Notify::new(),
            tick_lock: Mutex::new(()),
        }
    }

    /// Ask the background loop to push now instead of waiting for the timer.
    pub fn push_now(&self) {
        self.wake.notify_one();
    }

    /// Run one replication pass.
    pub async fn tick(&self) -> TickReport {
        let _serial = self.tick_lock.lock().await;

        // Read at push time so a newer epoch is never queued behind an older one.
        let Some(current) = self.store.snapshot().await else {
            return TickReport {
                skipped: true,
                ..TickReport::default()
            };
        };

        let pushes = self
            .registry
            .endpoints()
            .iter()
            .map(|endpoint| self.push_one(endpoint, &current));
        let results = join_all(pushes).await;

        let pushed = results.iter().filter(|ok| **ok).count();
        let report = TickReport {
            skipped: false,
            pushed,
            failed: results.len() - pushed,
        };

        if report.failed == 0 {
            debug!(epoch = current.epoch, keepers = pushed, "Root key replicated");
        } else {
            warn!(
                epoch = current.epoch,
                pushed = report.pushed,
                failed = report.failed,
                "Root key replication incomplete; make sure SPIKE Keepers are up and running"
            );
        }
        report
    }

    async fn push_one(&self, endpoint: &Arc<KeeperEndpoint>, key: &VersionedRootKey) -> bool {
        endpoint.record_push_attempt(Utc::now()).await;

        let result = match tokio::time::timeout(self.call_timeout, self.channel.push(endpoint, key)).await {
            Ok(result) => result,
            Err(_) => Err(KeeperClientError::Timeout),
        };

        match result {
            Ok(()) => {
                endpoint.record_push_success(Utc::now(), key.epoch).await;
                true
            }
            Err(e) => {
                warn!(keeper = endpoint.id(), "Unable to push root key: {}", e);
                endpoint.record_failure(e.to_string()).await;
                false
            }
        }
    }

    /// Tick on the configured interval (and on [`push_now`](Self::push_now))
    /// until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Replicator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            self.tick().await;
        }

        info!("Replicator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexus::testing::{registry_of, FakeKeepers};

    fn replicator(store: Arc<RootKeyStore>, registry: Arc<KeeperRegistry>, keepers: Arc<FakeKeepers>) -> Replicator {
        Replicator::new(
            store,
            registry,
            keepers,
            Duration::from_secs(300),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_tick_skips_without_key() {
        let registry = registry_of(3);
        let keepers = Arc::new(FakeKeepers::new());
        let replicator = replicator(Arc::new(RootKeyStore::new()), registry.clone(), keepers.clone());

        let report = replicator.tick().await;
        assert!(report.skipped);
        assert_eq!(keepers.held("keeper-1"), None);
        assert!(registry.endpoints()[0].stats().await.last_push_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_tick_pushes_to_every_keeper() {
        let store = Arc::new(RootKeyStore::new());
        store.generate_initial().await;
        let expected = store.snapshot().await.unwrap();

        let registry = registry_of(3);
        let keepers = Arc::new(FakeKeepers::new());
        let replicator = replicator(store, registry.clone(), keepers.clone());

        let report = replicator.tick().await;
        assert_eq!(report, TickReport { skipped: false, pushed: 3, failed: 0 });
        for endpoint in registry.endpoints() {
            assert_eq!(keepers.held(endpoint.id()), Some(expected.clone()));
            assert_eq!(endpoint.stats().await.last_known_epoch, Some(1));
        }
    }

    #[tokio::test]
    async fn test_unreachable_keeper_does_not_block_others() {
        let store = Arc::new(RootKeyStore::new());
        store.generate_initial().await;
        let expected = store.snapshot().await.unwrap();

        let registry = registry_of(3);
        let keepers = Arc::new(FakeKeepers::new());
        keepers.set_unreachable("keeper-2");
        keepers.set_hanging("keeper-3");
        let replicator = replicator(store, registry.clone(), keepers.clone());

        let report = replicator.tick().await;
        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(keepers.held("keeper-1"), Some(expected));
        assert_eq!(keepers.held("keeper-2"), None);

        let stats = registry.endpoints()[1].stats().await;
        assert!(stats.last_push_attempt_at.is_some());
        assert!(stats.last_push_success_at.is_none());
        assert!(stats.last_known_epoch.is_none());
        assert!(stats.last_error.is_some());

        // Timed out rather than stalled
        let stats = registry.endpoints()[2].stats().await;
        assert!(stats.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_stale_keeper_converges_on_next_tick() {
        let store = Arc::new(RootKeyStore::new());
        store.generate_initial().await;

        let registry = registry_of(2);
        let keepers = Arc::new(FakeKeepers::new());
        keepers.set_unreachable("keeper-2");
        let replicator = replicator(store.clone(), registry, keepers.clone());
        replicator.tick().await;

        store.regenerate().await;
        keepers.set_reachable("keeper-2");
        replicator.tick().await;

        let current = store.snapshot().await.unwrap();
        assert_eq!(current.epoch, 2);
        assert_eq!(keepers.held("keeper-1"), Some(current.clone()));
        assert_eq!(keepers.held("keeper-2"), Some(current));
    }

    #[tokio::test]
    async fn test_run_pushes_on_wake_and_stops_on_cancel() {
        let store = Arc::new(RootKeyStore::new());
        let registry = registry_of(1);
        let keepers = Arc::new(FakeKeepers::new());
        let replicator = Arc::new(replicator(store.clone(), registry, keepers.clone()));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(replicator.clone().run(cancel.clone()));

        // Let the immediate first tick pass with an empty store
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.generate_initial().await;
        replicator.push_now();

        let mut held = None;
        for _ in 0..50 {
            held = keepers.held("keeper-1");
            if held.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(held, store.snapshot().await);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("replicator did not stop")
            .unwrap();
    }
}
