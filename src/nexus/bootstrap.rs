//! One-time system initialization and admin credential changes.
//!
//! Initialization runs at most once: it is rejected when an admin credential
//! exists, when the root key store is already populated (by an earlier
//! bootstrap or by recovery), and when any Keeper still holds a key or cannot
//! be reached to confirm it holds none. Re-bootstrapping would otherwise mint
//! a new root key that the next replication tick pushes over the Keepers'
//! copies of the old one.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::error::{ApiError, AppError, AppResult};
use crate::nexus::credentials::{generate_admin_token, AdminCredential, CredentialVault, PasswordParams};
use crate::nexus::recovery::{KeeperAnswer, RecoveryCoordinator};
use crate::nexus::replicator::Replicator;
use crate::nexus::store::RootKeyStore;
use spike_types::ErrorCode;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("password must not be empty")]
    BadInput,

    #[error("system is already initialized")]
    AlreadyInitialized,

    /// Some Keepers did not answer, so they may still hold a root key.
    #[error("{unreachable} of {total} keepers could not confirm they hold no root key")]
    KeepersUnconfirmed { unreachable: usize, total: usize },

    #[error("server fault: {0}")]
    ServerFault(String),
}

impl BootstrapError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadInput => ErrorCode::BadInput,
            Self::AlreadyInitialized => ErrorCode::AlreadyInitialized,
            Self::KeepersUnconfirmed { .. } => ErrorCode::KeyUnavailable,
            Self::ServerFault(_) => ErrorCode::ServerFault,
        }
    }
}

impl From<BootstrapError> for ApiError {
    fn from(e: BootstrapError) -> Self {
        ApiError(e.code())
    }
}

pub struct Bootstrapper {
    vault: Arc<CredentialVault>,
    store: Arc<RootKeyStore>,
    replicator: Arc<Replicator>,
    recovery: Arc<RecoveryCoordinator>,
    params: PasswordParams,
    credentials_path: PathBuf,
    audit: Arc<dyn AuditSink>,
    /// Serializes initialization and password changes.
    guard: Mutex<()>,
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("credentials_path", &self.credentials_path)
            .finish_non_exhaustive()
    }
}

impl Bootstrapper {
    pub fn new(
        vault: Arc<CredentialVault>,
        store: Arc<RootKeyStore>,
        replicator: Arc<Replicator>,
        recovery: Arc<RecoveryCoordinator>,
        params: PasswordParams,
        credentials_path: PathBuf,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            vault,
            store,
            replicator,
            recovery,
            params,
            credentials_path,
            audit,
            guard: Mutex::new(()),
        }
    }

    /// Load the persisted admin credential, if one exists, and mint a fresh
    /// AdminToken for this process. Returns whether a credential was found.
    ///
    /// A record hashed below the minimum parameters is refused outright
    /// rather than loaded into a vault no login could ever pass.
    pub async fn restore(&self) -> AppResult<bool> {
        let path = &self.credentials_path;
        let Some(credential) = AdminCredential::load(path).await? else {
            info!("No admin credential at {}; waiting for initialization", path.display());
            return Ok(false);
        };
        if self.params.for_credential(&credential).is_none() {
            return Err(AppError::invalid_config(format!(
                "admin credential at {} was hashed with {} iterations and {} bytes, below the minimum",
                path.display(),
                credential.iterations,
                credential.hash_length
            )));
        }
        if credential.iterations != self.params.iterations() || credential.hash_length != self.params.hash_length() {
            info!("Admin credential uses its recorded hashing parameters; change the password to upgrade them");
        }
        self.vault.set_credential(credential).await;
        self.vault.set_admin_token(generate_admin_token()).await;
        info!("Admin credential restored from {}", path.display());
        Ok(true)
    }

    /// Initialize the admin credential and the first root key, then push the
    /// key to Keepers right away.
    pub async fn initialize(&self, password: &str) -> Result<u64, BootstrapError> {
        let result = self.try_initialize(password).await;
        match &result {
            Ok(epoch) => info!(epoch, "System initialized"),
            Err(BootstrapError::ServerFault(detail)) => error!("Initialization failed: {}", detail),
            Err(e) => warn!("Initialization rejected: {}", e),
        }
        self.audit.record(AuditEntry::from_result(
            AuditAction::Init,
            &result.as_ref().map(|_| ()).map_err(BootstrapError::code),
        ));
        result
    }

    async fn try_initialize(&self, password: &str) -> Result<u64, BootstrapError> {
        if password.is_empty() {
            return Err(BootstrapError::BadInput);
        }

        let _guard = self.guard.lock().await;
        if self.vault.has_credential().await || self.store.is_available().await {
            return Err(BootstrapError::AlreadyInitialized);
        }
        self.ensure_keepers_empty().await?;

        let credential = self.derive(password).await?;
        self.persist(&credential).await?;

        self.vault.set_admin_token(generate_admin_token()).await;
        self.vault.set_credential(credential).await;

        let epoch = self
            .store
            .generate_initial()
            .await
            .ok_or(BootstrapError::AlreadyInitialized)?;
        self.replicator.push_now();
        Ok(epoch)
    }

    /// Every configured Keeper must answer, and none may hold a key.
    async fn ensure_keepers_empty(&self) -> Result<(), BootstrapError> {
        let responses = self.recovery.collect().await;
        if let Some(holder) = responses
            .iter()
            .find(|r| matches!(r.answer, KeeperAnswer::Key(_)))
        {
            warn!(keeper = %holder.keeper_id, "Keeper holds a root key; refusing to initialize");
            return Err(BootstrapError::AlreadyInitialized);
        }
        let unreachable = responses
            .iter()
            .filter(|r| matches!(r.answer, KeeperAnswer::Failed(_)))
            .count();
        if unreachable > 0 {
            return Err(BootstrapError::KeepersUnconfirmed {
                unreachable,
                total: responses.len(),
            });
        }
        Ok(())
    }

    /// Replace the admin password. The AdminToken is kept, so existing
    /// sessions remain valid.
    pub async fn change_password(&self, password: &str) -> Result<(), BootstrapError> {
        let result = self.try_change_password(password).await;
        if let Err(e) = &result {
            warn!("Password change failed: {}", e);
        } else {
            info!("Admin password changed");
        }
        self.audit.record(AuditEntry::from_result(
            AuditAction::ChangePassword,
            &result.as_ref().map(|_| ()).map_err(BootstrapError::code),
        ));
        result
    }

    async fn try_change_password(&self, password: &str) -> Result<(), BootstrapError> {
        if password.is_empty() {
            return Err(BootstrapError::BadInput);
        }
        let _guard = self.guard.lock().await;
        if !self.vault.has_credential().await {
            return Err(BootstrapError::ServerFault("no credential to replace".to_string()));
        }
        let credential = self.derive(password).await?;
        self.persist(&credential).await?;
        self.vault.set_credential(credential).await;
        Ok(())
    }

    async fn derive(&self, password: &str) -> Result<AdminCredential, BootstrapError> {
        let params = self.params;
        let password = zeroize::Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || AdminCredential::derive(&password, &params))
            .await
            .map_err(|e| BootstrapError::ServerFault(format!("hashing task failed: {}", e)))
    }

    async fn persist(&self, credential: &AdminCredential) -> Result<(), BootstrapError> {
        credential
            .save(&self.credentials_path)
            .await
            .map_err(|e| BootstrapError::ServerFault(format!("failed to persist credential: {}", e)))
    }
}
