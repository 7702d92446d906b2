use crate::error::ApiError;
use crate::key::{RootKey, VersionedRootKey};
use crate::keeper::custody::KeeperCustody;
use crate::transport::PeerIdentity;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use spike_types::{ErrorCode, RootKeyCacheRequest, RootKeyReadResponse};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

/// Shared state for Keeper endpoints.
pub struct KeeperState {
    pub custody: KeeperCustody,
    /// Nexus identities allowed to push and read
    pub trusted_nexus: Vec<String>,
}

impl KeeperState {
    pub fn new(trusted_nexus: Vec<String>) -> Self {
        Self {
            custody: KeeperCustody::new(),
            trusted_nexus,
        }
    }

    fn authorize(&self, peer: &PeerIdentity) -> Result<(), ApiError> {
        if peer.is_one_of(&self.trusted_nexus) {
            Ok(())
        } else {
            warn!(peer = %peer.0, "Untrusted peer rejected");
            Err(ApiError(ErrorCode::Unauthorized))
        }
    }
}

/// Handler: POST /key
async fn receive(
    State(state): State<Arc<KeeperState>>,
    peer: PeerIdentity,
    body: Result<Json<RootKeyCacheRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&peer)?;

    let Json(mut request) = body.map_err(|e| {
        warn!("Malformed root key push: {}", e);
        ApiError(ErrorCode::BadInput)
    })?;

    let parsed = RootKey::from_hex(&request.root_key);
    request.root_key.zeroize();
    let key = parsed.map_err(|e| {
        warn!("Rejected root key push: {}", e);
        ApiError(ErrorCode::BadInput)
    })?;

    state
        .custody
        .receive(VersionedRootKey::new(key, request.epoch))
        .await;
    info!(epoch = request.epoch, "Root key received");
    Ok(StatusCode::OK)
}

/// Handler: GET /key
async fn show(
    State(state): State<Arc<KeeperState>>,
    peer: PeerIdentity,
) -> Result<Json<RootKeyReadResponse>, ApiError> {
    state.authorize(&peer)?;

    let response = match state.custody.show().await {
        Some(held) => RootKeyReadResponse {
            root_key: held.key.to_hex().as_str().to_owned(),
            epoch: held.epoch,
        },
        None => RootKeyReadResponse::default(),
    };
    debug!(epoch = response.epoch, "Root key read");
    Ok(Json(response))
}

/// Create the Keeper router.
pub fn keeper_router(state: Arc<KeeperState>) -> Router {
    Router::new()
        .route("/key", get(show).post(receive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
