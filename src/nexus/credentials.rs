//! Admin credential storage.
//!
//! [`CredentialVault`] is a plain holder for the admin credential record and
//! the AdminToken (the server-side session signing secret). It performs no
//! validation; [`PasswordParams`] owns the hashing parameters so bootstrap and
//! login can never disagree on them.

use crate::error::{AppError, AppResult};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

/// Salt length for freshly derived credentials.
pub const SALT_LEN: usize = 16;

/// Random bytes behind the AdminToken (after the `spike.` prefix).
const ADMIN_TOKEN_BYTES: usize = 32;

/// PBKDF2-HMAC-SHA256 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    iterations: u32,
    hash_length: usize,
}

impl PasswordParams {
    pub const MIN_ITERATIONS: u32 = 600_000;
    pub const MIN_HASH_LENGTH: usize = 32;
    pub const MAX_HASH_LENGTH: usize = 64;

    pub fn new(iterations: u32, hash_length: usize) -> AppResult<Self> {
        if iterations < Self::MIN_ITERATIONS {
            return Err(AppError::invalid_config(format!(
                "password iterations must be at least {}",
                Self::MIN_ITERATIONS
            )));
        }
        if !(Self::MIN_HASH_LENGTH..=Self::MAX_HASH_LENGTH).contains(&hash_length) {
            return Err(AppError::invalid_config(format!(
                "password hash length must be between {} and {} bytes",
                Self::MIN_HASH_LENGTH,
                Self::MAX_HASH_LENGTH
            )));
        }
        Ok(Self {
            iterations,
            hash_length,
        })
    }

    /// Skips the minimum checks. Only meant for tests, where 600k rounds per
    /// login would dominate the run time.
    pub fn new_unchecked(iterations: u32, hash_length: usize) -> Self {
        Self {
            iterations,
            hash_length,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn hash_length(&self) -> usize {
        self.hash_length
    }

    /// Stretch `password` with `salt`. CPU-bound; call from a blocking task.
    pub fn derive(&self, password: &[u8], salt: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; self.hash_length]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, self.iterations, out.as_mut_slice());
        out
    }

    /// Parameters to verify `credential` with: the record's own, provided
    /// they are no weaker than the hard minimums (or than `self`, when `self`
    /// is itself below them). `None` means the record must not be trusted.
    pub fn for_credential(&self, credential: &AdminCredential) -> Option<PasswordParams> {
        let min_iterations = self.iterations.min(Self::MIN_ITERATIONS);
        let min_hash_length = self.hash_length.min(Self::MIN_HASH_LENGTH);
        let acceptable = credential.iterations >= min_iterations
            && (min_hash_length..=Self::MAX_HASH_LENGTH).contains(&credential.hash_length);
        acceptable.then_some(Self {
            iterations: credential.iterations,
            hash_length: credential.hash_length,
        })
    }
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            iterations: Self::MIN_ITERATIONS,
            hash_length: Self::MIN_HASH_LENGTH,
        }
    }
}

/// The admin credential record. This is the only persisted state.
#[derive(Clone, Serialize, Deserialize)]
pub struct AdminCredential {
    /// Hex-encoded PBKDF2 output
    pub password_hash: String,
    /// Hex-encoded salt
    pub salt: String,
    pub iterations: u32,
    pub hash_length: usize,
}

impl AdminCredential {
    /// Derive a credential for `password` with a fresh random salt.
    pub fn derive(password: &str, params: &PasswordParams) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = params.derive(password.as_bytes(), &salt);
        Self {
            password_hash: hex::encode(hash.as_slice()),
            salt: hex::encode(salt),
            iterations: params.iterations(),
            hash_length: params.hash_length(),
        }
    }

    /// Load a persisted credential. A missing file is not an error.
    pub async fn load(path: &Path) -> AppResult<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the credential, replacing any previous record atomically.
    pub async fn save(&self, path: &Path) -> AppResult<()> {
        let raw = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("iterations", &self.iterations)
            .field("hash_length", &self.hash_length)
            .finish_non_exhaustive()
    }
}

/// Generate a new AdminToken: `spike.` followed by random hex.
pub fn generate_admin_token() -> Zeroizing<String> {
    let mut raw = Zeroizing::new([0u8; ADMIN_TOKEN_BYTES]);
    OsRng.fill_bytes(&mut *raw);
    Zeroizing::new(format!("spike.{}", hex::encode(&*raw)))
}

/// In-memory holder for the admin credential and AdminToken.
pub struct CredentialVault {
    credential: RwLock<Option<AdminCredential>>,
    admin_token: RwLock<Option<Zeroizing<String>>>,
}

impl CredentialVault {
    pub fn new() -> Self {
        Self {
            credential: RwLock::new(None),
            admin_token: RwLock::new(None),
        }
    }

    pub async fn credential(&self) -> Option<AdminCredential> {
        self.credential.read().await.clone()
    }

    pub async fn set_credential(&self, credential: AdminCredential) {
        *self.credential.write().await = Some(credential);
    }

    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }

    pub async fn admin_token(&self) -> Option<Zeroizing<String>> {
        self.admin_token.read().await.clone()
    }

    pub async fn set_admin_token(&self, token: Zeroizing<String>) {
        *self.admin_token.write().await = Some(token);
    }
}

impl Default for CredentialVault {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> PasswordParams {
        PasswordParams::new_unchecked(1_000, 32)
    }

    #[test]
    fn test_params_enforce_minimums() {
        assert!(PasswordParams::new(599_999, 32).is_err());
        assert!(PasswordParams::new(600_000, 31).is_err());
        assert!(PasswordParams::new(600_000, 65).is_err());
        let params = PasswordParams::new(600_000, 32).unwrap();
        assert_eq!(params, PasswordParams::default());
    }

    #[test]
    fn test_derive_is_deterministic_per_salt() {
        let params = fast_params();
        let a = params.derive(b"pw", b"salt-one");
        let b = params.derive(b"pw", b"salt-one");
        let c = params.derive(b"pw", b"salt-two");
        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), c.as_slice());
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_credential_uses_fresh_salt() {
        let params = fast_params();
        let a = AdminCredential::derive("pw", &params);
        let b = AdminCredential::derive("pw", &params);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
        assert_eq!(hex::decode(&a.salt).unwrap().len(), SALT_LEN);
        assert_eq!(params.for_credential(&a), Some(params));
    }

    #[test]
    fn test_verification_uses_record_parameters() {
        let mut record = AdminCredential {
            password_hash: "00".repeat(32),
            salt: "00".repeat(SALT_LEN),
            iterations: 600_000,
            hash_length: 32,
        };

        // Stronger than configured: verified with the record's own settings
        let configured = PasswordParams::default();
        record.iterations = 900_000;
        record.hash_length = 48;
        let params = configured.for_credential(&record).unwrap();
        assert_eq!(params.iterations(), 900_000);
        assert_eq!(params.hash_length(), 48);

        // Configured higher than the record, record still above the floor
        let raised = PasswordParams::new(1_200_000, 32).unwrap();
        assert!(raised.for_credential(&record).is_some());

        // Below the hard minimums
        record.iterations = 100_000;
        assert!(configured.for_credential(&record).is_none());
        record.iterations = 600_000;
        record.hash_length = 16;
        assert!(configured.for_credential(&record).is_none());
        record.hash_length = 1 << 20;
        assert!(configured.for_credential(&record).is_none());
    }

    #[test]
    fn test_admin_token_format() {
        let a = generate_admin_token();
        let b = generate_admin_token();
        assert!(a.starts_with("spike."));
        assert_eq!(a.len(), "spike.".len() + ADMIN_TOKEN_BYTES * 2);
        assert_ne!(*a, *b);
    }

    #[tokio::test]
    async fn test_vault_starts_empty() {
        let vault = CredentialVault::new();
        assert!(!vault.has_credential().await);
        assert!(vault.admin_token().await.is_none());

        vault.set_credential(AdminCredential::derive("pw", &fast_params())).await;
        vault.set_admin_token(generate_admin_token()).await;
        assert!(vault.has_credential().await);
        assert!(vault.admin_token().await.is_some());
    }

    #[tokio::test]
    async fn test_credential_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");

        assert!(AdminCredential::load(&path).await.unwrap().is_none());

        let credential = AdminCredential::derive("pw", &fast_params());
        credential.save(&path).await.unwrap();

        let loaded = AdminCredential::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.password_hash, credential.password_hash);
        assert_eq!(loaded.salt, credential.salt);
        assert_eq!(loaded.iterations, 1_000);
    }

    #[tokio::test]
    async fn test_corrupt_credential_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            AdminCredential::load(&path).await,
            Err(AppError::CorruptCredential(_))
        ));
    }
}
