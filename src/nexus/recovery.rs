//! Root key recovery from Keepers by quorum.
//!
//! Every Keeper is queried concurrently; once all answers are in (or have
//! timed out) a single key value must be reported by at least
//! `floor(N/2) + 1` of the N configured Keepers to be accepted. Anything less
//! leaves the store empty: an uncorroborated key is never adopted.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::error::ApiError;
use crate::key::VersionedRootKey;
use crate::nexus::keeper_client::{KeeperChannel, KeeperClientError};
use crate::nexus::registry::{KeeperEndpoint, KeeperRegistry};
use crate::nexus::replicator::Replicator;
use crate::nexus::store::RootKeyStore;
use futures::future::join_all;
use spike_types::ErrorCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// No value was corroborated by enough Keepers.
    #[error("quorum not reached: best agreement {agreeing} of {threshold} required ({responded}/{total} keepers returned a key)")]
    QuorumNotReached {
        agreeing: usize,
        threshold: usize,
        responded: usize,
        total: usize,
    },
}

impl From<RecoveryError> for ApiError {
    fn from(_: RecoveryError) -> Self {
        ApiError(ErrorCode::KeyUnavailable)
    }
}

/// What one Keeper answered.
#[derive(Debug, Clone)]
pub enum KeeperAnswer {
    Key(VersionedRootKey),
    Empty,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct KeeperResponse {
    pub keeper_id: String,
    pub answer: KeeperAnswer,
}

/// Minimum number of agreeing Keepers out of `total`.
pub fn quorum_threshold(total: usize) -> usize {
    total / 2 + 1
}

/// Decide which key, if any, the responses corroborate.
///
/// Keys are grouped by value. The accepted epoch is the highest one reported
/// for the winning value.
pub fn decide(total: usize, responses: &[KeeperResponse]) -> Result<VersionedRootKey, RecoveryError> {
    let threshold = quorum_threshold(total);
    let mut groups: Vec<(VersionedRootKey, usize)> = Vec::new();
    let mut responded = 0;

    for response in responses {
        let KeeperAnswer::Key(candidate) = &response.answer else {
            continue;
        };
        responded += 1;
        match groups.iter_mut().find(|(k, _)| k.key == candidate.key) {
            Some((existing, count)) => {
                *count += 1;
                existing.epoch = existing.epoch.max(candidate.epoch);
            }
            None => groups.push((candidate.clone(), 1)),
        }
    }

    let best = groups.iter().map(|(_, count)| *count).max().unwrap_or(0);
    groups
        .into_iter()
        .find(|(_, count)| *count >= threshold)
        .map(|(key, _)| key)
        .ok_or(RecoveryError::QuorumNotReached {
            agreeing: best,
            threshold,
            responded,
            total,
        })
}

pub struct RecoveryCoordinator {
    store: Arc<RootKeyStore>,
    registry: Arc<KeeperRegistry>,
    channel: Arc<dyn KeeperChannel>,
    replicator: Arc<Replicator>,
    call_timeout: Duration,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("keepers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl RecoveryCoordinator {
    pub fn new(
        store: Arc<RootKeyStore>,
        registry: Arc<KeeperRegistry>,
        channel: Arc<dyn KeeperChannel>,
        replicator: Arc<Replicator>,
        call_timeout: Duration,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            registry,
            channel,
            replicator,
            call_timeout,
            audit,
        }
    }

    /// Query every Keeper concurrently and wait for all of them.
    pub async fn collect(&self) -> Vec<KeeperResponse> {
        let queries = self
            .registry
            .endpoints()
            .iter()
            .map(|endpoint| self.query_one(endpoint));
        join_all(queries).await
    }

    async fn query_one(&self, endpoint: &Arc<KeeperEndpoint>) -> KeeperResponse {
        let result = match tokio::time::timeout(self.call_timeout, self.channel.show(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(KeeperClientError::Timeout),
        };

        let answer = match result {
            Ok(Some(key)) => {
                endpoint.record_observed_epoch(Some(key.epoch)).await;
                KeeperAnswer::Key(key)
            }
            Ok(None) => {
                endpoint.record_observed_epoch(None).await;
                KeeperAnswer::Empty
            }
            Err(e) => {
                warn!(keeper = endpoint.id(), "Unable to read root key: {}", e);
                endpoint.record_failure(e.to_string()).await;
                KeeperAnswer::Failed(e.to_string())
            }
        };

        KeeperResponse {
            keeper_id: endpoint.id().to_string(),
            answer,
        }
    }

    /// Reconstruct the root key from Keepers and install it.
    ///
    /// If the store already holds a key (bootstrap or an earlier recovery won
    /// the race), nothing is replaced and the current epoch is returned.
    pub async fn recover(&self) -> Result<u64, RecoveryError> {
        let result = self.try_recover().await;
        self.audit.record(AuditEntry::from_result(
            AuditAction::Recover,
            &result.as_ref().map(|_| ()).map_err(|_| ErrorCode::KeyUnavailable),
        ));
        result
    }

    async fn try_recover(&self) -> Result<u64, RecoveryError> {
        if let Some(epoch) = self.store.epoch().await {
            info!(epoch, "Root key already available; skipping recovery");
            return Ok(epoch);
        }

        let responses = self.collect().await;
        let recovered = match decide(self.registry.len(), &responses) {
            Ok(key) => key,
            Err(e) => {
                error!("Root key recovery failed: {}", e);
                return Err(e);
            }
        };

        let epoch = recovered.epoch;
        if self.store.install_if_empty(recovered).await {
            info!(epoch, "Root key recovered from keepers");
            // Bring minority and unreachable Keepers back in line.
            self.replicator.push_now();
            Ok(epoch)
        } else {
            let current = self.store.epoch().await.unwrap_or(epoch);
            info!(epoch = current, "Root key installed concurrently; discarding recovered value");
            Ok(current)
        }
    }

    /// Retry recovery on an interval until the store holds a key or `cancel`
    /// fires.
    pub async fn retry_until_available(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        loop {
            if self.store.is_available().await {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if self.store.is_available().await {
                return;
            }
            if self.recover().await.is_ok() {
                return;
            }
        }
    }
}
