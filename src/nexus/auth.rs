//! Admin authentication.
//!
//! Login stretches the submitted password with the stored salt, compares the
//! result against the stored hash in constant time, and on success issues a
//! short-lived HS256 session token signed with the AdminToken. Tokens are
//! stateless: signature and expiry are all that is checked.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::error::ApiError;
use crate::nexus::credentials::{CredentialVault, PasswordParams};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use spike_types::ErrorCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

/// Subject claim carried by every admin session token.
pub const ADMIN_SUBJECT: &str = "spike-admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed request")]
    BadInput,

    #[error("unauthorized")]
    Unauthorized,

    /// Detail is for server-side logs only.
    #[error("server fault: {0}")]
    ServerFault(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadInput => ErrorCode::BadInput,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::ServerFault(_) => ErrorCode::ServerFault,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError(e.code())
    }
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        ApiError::from(self).into_response()
    }
}

/// Claims inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// Compare two byte strings without leaking where they first differ.
///
/// Unequal lengths compare unequal; for equal lengths every byte is examined.
pub fn hashes_match(candidate: &[u8], stored: &[u8]) -> bool {
    #[cfg(test)]
    tests::CONSTANT_TIME_COMPARISONS.with(|count| count.set(count.get() + 1));
    candidate.ct_eq(stored).into()
}

fn now_secs() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::ServerFault(format!("system time error: {}", e)))
}

/// Validates admin passwords and issues/validates session tokens.
pub struct AuthGate {
    vault: Arc<CredentialVault>,
    params: PasswordParams,
    session_ttl: Duration,
    audit: Arc<dyn AuditSink>,
}

impl AuthGate {
    pub fn new(
        vault: Arc<CredentialVault>,
        params: PasswordParams,
        session_ttl: Duration,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            vault,
            params,
            session_ttl,
            audit,
        }
    }

    /// Check `password` and issue a session token. Every attempt is audited.
    pub async fn login(&self, password: &str) -> Result<String, AuthError> {
        let result = self.try_login(password).await;
        match &result {
            Ok(_) => info!("Admin login authorized"),
            Err(AuthError::ServerFault(detail)) => error!("Admin login failed: {}", detail),
            Err(e) => warn!("Admin login rejected: {}", e),
        }
        self.audit.record(AuditEntry::from_result(
            AuditAction::Login,
            &result.as_ref().map(|_| ()).map_err(AuthError::code),
        ));
        result
    }

    async fn try_login(&self, password: &str) -> Result<String, AuthError> {
        let credential = self
            .vault
            .credential()
            .await
            .ok_or(AuthError::Unauthorized)?;

        let params = self.params.for_credential(&credential).ok_or_else(|| {
            AuthError::ServerFault("stored credential uses hashing parameters below the minimum".to_string())
        })?;

        let salt = hex::decode(&credential.salt)
            .map_err(|e| AuthError::ServerFault(format!("problem decoding salt: {}", e)))?;
        let stored = Zeroizing::new(
            hex::decode(&credential.password_hash)
                .map_err(|e| AuthError::ServerFault(format!("problem decoding password hash: {}", e)))?,
        );

        let password = Zeroizing::new(password.as_bytes().to_vec());
        let candidate = tokio::task::spawn_blocking(move || params.derive(&password, &salt))
            .await
            .map_err(|e| AuthError::ServerFault(format!("hashing task failed: {}", e)))?;

        if !hashes_match(&candidate, &stored) {
            return Err(AuthError::Unauthorized);
        }

        let admin_token = self
            .vault
            .admin_token()
            .await
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::ServerFault("admin token not set".to_string()))?;

        self.issue(&admin_token)
    }

    fn issue(&self, admin_token: &str) -> Result<String, AuthError> {
        let iat = now_secs()?;
        let claims = SessionClaims {
            sub: ADMIN_SUBJECT.to_string(),
            iat,
            exp: iat + self.session_ttl.as_secs(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(admin_token.as_bytes()),
        )
        .map_err(|e| AuthError::ServerFault(format!("failed to sign token: {}", e)))
    }

    /// Validate a session token against the current AdminToken.
    pub async fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let admin_token = self
            .vault
            .admin_token()
            .await
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.sub = Some(ADMIN_SUBJECT.to_string());

        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(admin_token.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            warn!("Session token rejected: {}", e);
            AuthError::Unauthorized
        })
    }
}
