//! In-memory holder of the current root key on the Nexus side.

use crate::key::{RootKey, VersionedRootKey};
use tokio::sync::RwLock;

/// Holds at most one current `(key, epoch)` pair.
///
/// The store is empty until bootstrap or recovery installs a key. Replaced
/// keys are zeroized when the old value is dropped.
pub struct RootKeyStore {
    current: RwLock<Option<VersionedRootKey>>,
}

impl RootKeyStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// A copy of the current key, if any.
    pub async fn snapshot(&self) -> Option<VersionedRootKey> {
        self.current.read().await.clone()
    }

    pub async fn is_available(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn epoch(&self) -> Option<u64> {
        self.current.read().await.as_ref().map(|k| k.epoch)
    }

    /// Generate the first key at epoch 1. Returns `None` if a key is
    /// already present.
    pub async fn generate_initial(&self) -> Option<u64> {
        let mut guard = self.current.write().await;
        if guard.is_some() {
            return None;
        }
        *guard = Some(VersionedRootKey::new(RootKey::generate(), 1));
        Some(1)
    }

    /// Replace the current key with a fresh one at the next epoch. Returns
    /// `None` if there is no key to regenerate.
    pub async fn regenerate(&self) -> Option<u64> {
        let mut guard = self.current.write().await;
        let next = guard.as_ref()?.epoch + 1;
        *guard = Some(VersionedRootKey::new(RootKey::generate(), next));
        Some(next)
    }

    /// Install a recovered key, but only into an empty store.
    pub async fn install_if_empty(&self, key: VersionedRootKey) -> bool {
        let mut guard = self.current.write().await;
        if guard.is_some() {
            return false;
        }
        *guard = Some(key);
        true
    }
}

impl Default for RootKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RootKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootKeyStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_lifecycle() {
        let store = RootKeyStore::new();
        assert!(!store.is_available().await);
        assert!(store.snapshot().await.is_none());
        assert_eq!(store.regenerate().await, None);

        assert_eq!(store.generate_initial().await, Some(1));
        let first = store.snapshot().await.unwrap();
        assert_eq!(first.epoch, 1);

        // Cannot initialize twice
        assert_eq!(store.generate_initial().await, None);
        assert_eq!(store.snapshot().await.unwrap(), first);

        assert_eq!(store.regenerate().await, Some(2));
        let second = store.snapshot().await.unwrap();
        assert_eq!(second.epoch, 2);
        assert_ne!(second.key, first.key);
    }

    #[tokio::test]
    async fn test_install_only_into_empty_store() {
        let store = RootKeyStore::new();
        let recovered = VersionedRootKey::new(RootKey::generate(), 7);
        assert!(store.install_if_empty(recovered.clone()).await);
        assert_eq!(store.epoch().await, Some(7));

        let other = VersionedRootKey::new(RootKey::generate(), 8);
        assert!(!store.install_if_empty(other).await);
        assert_eq!(store.snapshot().await.unwrap(), recovered);
    }
}
