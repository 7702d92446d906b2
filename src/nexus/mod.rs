//! SPIKE Nexus: root key custody and the admin gate.
//!
//! ## Architecture
//!
//! ```text
//!        admin CLI
//!            │ POST /init, /login, ...
//!            ▼
//! ┌─────────────────────┐      ┌────────────────┐
//! │ AuthGate/Bootstrap  │─────▶│ CredentialVault│
//! └──────────┬──────────┘      └────────────────┘
//!            ▼
//! ┌─────────────────────┐
//! │    RootKeyStore     │◀──── RecoveryCoordinator (startup, quorum)
//! └──────────┬──────────┘                 ▲
//!            │ every tick / push_now      │ GET /key
//!            ▼                            │
//! ┌─────────────────────┐      ┌──────────┴─────┐
//! │     Replicator      │─────▶│ Keepers (N)    │
//! └─────────────────────┘ POST └────────────────┘
//! ```
//!
//! Startup order matters: recovery runs to completion before the router is
//! served, and key-dependent routes refuse requests until a key is present.

pub mod auth;
pub mod bootstrap;
pub mod credentials;
pub mod keeper_client;
pub mod recovery;
pub mod registry;
pub mod replicator;
pub mod routes;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthError, AuthGate, SessionClaims};
pub use bootstrap::{BootstrapError, Bootstrapper};
pub use credentials::{AdminCredential, CredentialVault, PasswordParams};
pub use keeper_client::{HttpKeeperChannel, KeeperChannel, KeeperClientError};
pub use recovery::{RecoveryCoordinator, RecoveryError};
pub use registry::{KeeperEndpoint, KeeperRegistry};
pub use replicator::{Replicator, TickReport};
pub use routes::nexus_router;
pub use store::RootKeyStore;

use crate::audit::AuditSink;
use crate::config::NexusConfig;
use crate::error::AppResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// All Nexus components, wired together.
pub struct Nexus {
    pub vault: Arc<CredentialVault>,
    pub store: Arc<RootKeyStore>,
    pub registry: Arc<KeeperRegistry>,
    pub replicator: Arc<Replicator>,
    pub recovery: Arc<RecoveryCoordinator>,
    pub auth: Arc<AuthGate>,
    pub bootstrap: Arc<Bootstrapper>,
    pub audit: Arc<dyn AuditSink>,
    config: NexusConfig,
}

impl std::fmt::Debug for Nexus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nexus")
            .field("keepers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Nexus {
    /// Build from validated configuration.
    pub fn new(config: &NexusConfig, channel: Arc<dyn KeeperChannel>, audit: Arc<dyn AuditSink>) -> AppResult<Self> {
        let params = config.password_params()?;
        Ok(Self::with_params(config, params, channel, audit))
    }

    /// Build with the HTTP Keeper channel, identified as `config.identity`.
    pub fn connect(config: &NexusConfig, audit: Arc<dyn AuditSink>) -> AppResult<Self> {
        let channel = HttpKeeperChannel::new(config.identity.clone(), config.keeper_timeout())?;
        Self::new(config, Arc::new(channel), audit)
    }

    /// Build with explicit password parameters.
    pub fn with_params(
        config: &NexusConfig,
        params: PasswordParams,
        channel: Arc<dyn KeeperChannel>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let vault = Arc::new(CredentialVault::new());
        let store = Arc::new(RootKeyStore::new());
        let registry = Arc::new(KeeperRegistry::new(&config.keepers));
        let replicator = Arc::new(Replicator::new(
            store.clone(),
            registry.clone(),
            channel.clone(),
            config.replication_interval(),
            config.keeper_timeout(),
        ));
        let recovery = Arc::new(RecoveryCoordinator::new(
            store.clone(),
            registry.clone(),
            channel,
            replicator.clone(),
            config.keeper_timeout(),
            audit.clone(),
        ));
        let auth = Arc::new(AuthGate::new(
            vault.clone(),
            params,
            config.session_ttl(),
            audit.clone(),
        ));
        let bootstrap = Arc::new(Bootstrapper::new(
            vault.clone(),
            store.clone(),
            replicator.clone(),
            recovery.clone(),
            params,
            config.credentials_path.clone(),
            audit.clone(),
        ));

        Self {
            vault,
            store,
            registry,
            replicator,
            recovery,
            auth,
            bootstrap,
            audit,
            config: config.clone(),
        }
    }

    /// Restore the admin credential, recover the root key, and start the
    /// background tasks. Returns once the startup recovery attempt has
    /// finished, successfully or not.
    pub async fn start(&self, cancel: &CancellationToken) -> AppResult<Vec<JoinHandle<()>>> {
        self.bootstrap.restore().await?;

        let mut handles = Vec::new();
        match self.recovery.recover().await {
            Ok(epoch) => info!(epoch, "Root key available"),
            Err(e) => {
                warn!(
                    "Starting without a root key ({}); key-dependent requests will be refused \
                    until keepers reach quorum or the system is initialized",
                    e
                );
                handles.push(tokio::spawn(
                    self.recovery
                        .clone()
                        .retry_until_available(self.config.recovery_retry(), cancel.clone()),
                ));
            }
        }

        handles.push(tokio::spawn(self.replicator.clone().run(cancel.clone())));
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::{KeeperEndpointConfig, PasswordConfig};
    use crate::error::AppError;
    use crate::nexus::testing::FakeKeepers;
    use std::path::Path;

    fn config(credentials_path: &Path) -> NexusConfig {
        NexusConfig {
            listen: "127.0.0.1:0".to_string(),
            identity: "spiffe://spike.ist/spike/nexus".to_string(),
            keepers: (1..=3)
                .map(|i| KeeperEndpointConfig {
                    id: format!("keeper-{}", i),
                    url: format!("http://keeper-{}:8443", i),
                })
                .collect(),
            replication_interval_secs: 300,
            keeper_timeout_secs: 1,
            recovery_retry_secs: 30,
            session_ttl_secs: 3600,
            password: PasswordConfig::default(),
            credentials_path: credentials_path.to_path_buf(),
        }
    }

    #[test]
    fn test_connect_builds_http_channel() {
        let dir = tempfile::tempdir().unwrap();
        let nexus = Nexus::connect(&config(&dir.path().join("admin.json")), Arc::new(MemoryAuditSink::default()))
            .unwrap();
        assert_eq!(nexus.registry.len(), 3);
    }

    #[test]
    fn test_http_failures_convert_to_app_error() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Http(_)));
    }

    #[tokio::test]
    async fn test_start_refuses_weak_persisted_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        AdminCredential::derive("pw", &PasswordParams::new_unchecked(10, 32))
            .save(&path)
            .await
            .unwrap();

        let nexus = Nexus::with_params(
            &config(&path),
            PasswordParams::new_unchecked(1_000, 32),
            Arc::new(FakeKeepers::new()),
            Arc::new(MemoryAuditSink::default()),
        );
        let cancel = CancellationToken::new();
        assert!(matches!(nexus.start(&cancel).await, Err(AppError::InvalidConfig(_))));
    }
}
