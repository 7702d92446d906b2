//! In-memory Keepers for unit tests.

use crate::config::KeeperEndpointConfig;
use crate::key::VersionedRootKey;
use crate::nexus::keeper_client::{KeeperChannel, KeeperClientError};
use crate::nexus::registry::{KeeperEndpoint, KeeperRegistry};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Registry of `n` Keepers named `keeper-1` .. `keeper-n`.
pub fn registry_of(n: usize) -> Arc<KeeperRegistry> {
    let configs: Vec<_> = (1..=n)
        .map(|i| KeeperEndpointConfig {
            id: format!("keeper-{}", i),
            url: format!("http://keeper-{}:8443", i),
        })
        .collect();
    Arc::new(KeeperRegistry::new(&configs))
}

/// Keepers that hold keys in a map. Individual Keepers can be made to fail
/// fast or to never answer.
#[derive(Default)]
pub struct FakeKeepers {
    held: Mutex<HashMap<String, VersionedRootKey>>,
    unreachable: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
}

impl FakeKeepers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self, id: &str, key: VersionedRootKey) {
        self.held.lock().unwrap().insert(id.to_string(), key);
    }

    pub fn held(&self, id: &str) -> Option<VersionedRootKey> {
        self.held.lock().unwrap().get(id).cloned()
    }

    pub fn set_unreachable(&self, id: &str) {
        self.unreachable.lock().unwrap().insert(id.to_string());
    }

    pub fn set_reachable(&self, id: &str) {
        self.unreachable.lock().unwrap().remove(id);
        self.hanging.lock().unwrap().remove(id);
    }

    pub fn set_hanging(&self, id: &str) {
        self.hanging.lock().unwrap().insert(id.to_string());
    }

    async fn gate(&self, id: &str) -> Result<(), KeeperClientError> {
        let hanging = self.hanging.lock().unwrap().contains(id);
        if hanging {
            std::future::pending::<()>().await;
        }
        if self.unreachable.lock().unwrap().contains(id) {
            return Err(KeeperClientError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeeperChannel for FakeKeepers {
    async fn push(&self, keeper: &KeeperEndpoint, key: &VersionedRootKey) -> Result<(), KeeperClientError> {
        self.gate(keeper.id()).await?;
        self.hold(keeper.id(), key.clone());
        Ok(())
    }

    async fn show(&self, keeper: &KeeperEndpoint) -> Result<Option<VersionedRootKey>, KeeperClientError> {
        self.gate(keeper.id()).await?;
        Ok(self.held(keeper.id()))
    }
}
