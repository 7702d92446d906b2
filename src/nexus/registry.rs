//! Configured Keepers and their replication bookkeeping.

use crate::config::KeeperEndpointConfig;
use chrono::{DateTime, Utc};
use spike_types::KeeperStatus;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Diagnostics written by the Replicator and RecoveryCoordinator only.
#[derive(Debug, Clone, Default)]
pub struct EndpointStats {
    pub last_push_attempt_at: Option<DateTime<Utc>>,
    pub last_push_success_at: Option<DateTime<Utc>>,
    pub last_known_epoch: Option<u64>,
    pub last_error: Option<String>,
}

/// One configured Keeper.
#[derive(Debug)]
pub struct KeeperEndpoint {
    config: KeeperEndpointConfig,
    stats: RwLock<EndpointStats>,
}

impl KeeperEndpoint {
    pub fn new(config: KeeperEndpointConfig) -> Self {
        Self {
            config,
            stats: RwLock::new(EndpointStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Full URL for a path on this Keeper.
    pub fn endpoint(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    pub async fn stats(&self) -> EndpointStats {
        self.stats.read().await.clone()
    }

    pub async fn record_push_attempt(&self, at: DateTime<Utc>) {
        self.stats.write().await.last_push_attempt_at = Some(at);
    }

    pub async fn record_push_success(&self, at: DateTime<Utc>, epoch: u64) {
        let mut stats = self.stats.write().await;
        stats.last_push_success_at = Some(at);
        stats.last_known_epoch = Some(epoch);
        stats.last_error = None;
    }

    pub async fn record_failure(&self, error: String) {
        self.stats.write().await.last_error = Some(error);
    }

    /// What a recovery query observed on this Keeper.
    pub async fn record_observed_epoch(&self, epoch: Option<u64>) {
        let mut stats = self.stats.write().await;
        stats.last_known_epoch = epoch;
        stats.last_error = None;
    }

    pub async fn status(&self) -> KeeperStatus {
        let stats = self.stats().await;
        KeeperStatus {
            id: self.id().to_string(),
            url: self.url().to_string(),
            last_push_attempt_at: stats.last_push_attempt_at.map(|t| t.to_rfc3339()),
            last_push_success_at: stats.last_push_success_at.map(|t| t.to_rfc3339()),
            last_known_epoch: stats.last_known_epoch,
            last_error: stats.last_error,
        }
    }
}

/// Static list of Keepers. Endpoints are never added or removed at runtime.
#[derive(Debug)]
pub struct KeeperRegistry {
    endpoints: Vec<Arc<KeeperEndpoint>>,
}

impl KeeperRegistry {
    pub fn new(configs: &[KeeperEndpointConfig]) -> Self {
        Self {
            endpoints: configs
                .iter()
                .cloned()
                .map(|c| Arc::new(KeeperEndpoint::new(c)))
                .collect(),
        }
    }

    pub fn endpoints(&self) -> &[Arc<KeeperEndpoint>] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub async fn statuses(&self) -> Vec<KeeperStatus> {
        let mut out = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            out.push(endpoint.status().await);
        }
        out
    }
}
