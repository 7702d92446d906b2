//! Keeper-side root key custody.
//!
//! The held key lives only in memory and is zeroized when replaced or when
//! the Keeper exits.

use crate::key::VersionedRootKey;
use tokio::sync::RwLock;

/// Holds the last root key pushed by Nexus.
pub struct KeeperCustody {
    held: RwLock<Option<VersionedRootKey>>,
}

impl KeeperCustody {
    pub fn new() -> Self {
        Self {
            held: RwLock::new(None),
        }
    }

    /// Overwrite the held key. Last writer wins; no epoch check is made
    /// because the caller is an authenticated Nexus.
    pub async fn receive(&self, key: VersionedRootKey) {
        *self.held.write().await = Some(key);
    }

    /// The held key, or `None` before anything was received.
    pub async fn show(&self) -> Option<VersionedRootKey> {
        self.held.read().await.clone()
    }
}

impl Default for KeeperCustody {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeeperCustody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeeperCustody").finish_non_exhaustive()
    }
}
