//! Peer identity as established by the mutual-TLS layer.
//!
//! TLS termination and certificate validation happen outside this crate. The
//! terminator forwards the verified workload identity in
//! [`PEER_ID_HEADER`](spike_types::PEER_ID_HEADER); handlers only ever see it
//! through the [`PeerIdentity`] extractor.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use spike_types::{ErrorCode, PEER_ID_HEADER};
use tracing::warn;

/// The authenticated identity of the calling workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity(pub String);

impl PeerIdentity {
    /// Whether this peer is one of `trusted`.
    pub fn is_one_of(&self, trusted: &[String]) -> bool {
        trusted.iter().any(|t| t == &self.0)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PeerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .headers
            .get(PEER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match identity {
            Some(id) => Ok(Self(id.to_string())),
            None => {
                warn!("Request without peer identity rejected");
                Err(ApiError(ErrorCode::Unauthorized))
            }
        }
    }
}
