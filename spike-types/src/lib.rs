//! Request and response bodies exchanged between SPIKE processes.
//!
//! Nexus, Keeper and the admin CLI all (de)serialize these as JSON. Error
//! bodies only ever carry an [`ErrorCode`]; internal error text stays on the
//! server side.

use serde::{Deserialize, Serialize};

/// Closed set of error codes that may cross the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadInput,
    Unauthorized,
    ServerFault,
    AlreadyInitialized,
    KeyUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadInput => "bad_input",
            Self::Unauthorized => "unauthorized",
            Self::ServerFault => "server_fault",
            Self::AlreadyInitialized => "already_initialized",
            Self::KeyUnavailable => "key_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic error body: `{"err": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub err: ErrorCode,
}

// --- Nexus admin surface ---

/// `POST /login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginRequest {
    pub password: String,
}

/// Either `{"token": "..."}` or `{"err": "..."}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminLoginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<ErrorCode>,
}

/// `POST /init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub password: String,
}

/// `POST /password`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

/// Returned by `/recover` and `/root-key/rotate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochResponse {
    pub epoch: u64,
}

/// `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusStatusResponse {
    pub initialized: bool,
    pub key_available: bool,
    pub epoch: Option<u64>,
}

/// One row of `GET /keepers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperStatus {
    pub id: String,
    pub url: String,
    pub last_push_attempt_at: Option<String>,
    pub last_push_success_at: Option<String>,
    pub last_known_epoch: Option<u64>,
    pub last_error: Option<String>,
}

// --- Keeper custody surface ---

/// `POST /key` body. The key is hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootKeyCacheRequest {
    pub root_key: String,
    #[serde(default)]
    pub epoch: u64,
}

/// `GET /key` body. `root_key` is empty when nothing has been received yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootKeyReadResponse {
    pub root_key: String,
    #[serde(default)]
    pub epoch: u64,
}

/// Header carrying the peer workload identity established by the mTLS layer.
pub const PEER_ID_HEADER: &str = "x-spike-peer-id";
