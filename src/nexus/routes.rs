//! Nexus admin HTTP surface.
//!
//! Exposes endpoints for:
//! - Bootstrapping the system and logging in as admin
//! - Readiness and per-Keeper replication status
//! - On-demand recovery, root key regeneration and password changes

use crate::audit::{AuditAction, AuditEntry};
use crate::error::{status_for, ApiError};
use crate::nexus::auth::SessionClaims;
use crate::nexus::Nexus;
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use spike_types::{
    AdminLoginRequest, AdminLoginResponse, ChangePasswordRequest, EpochResponse, ErrorCode,
    InitRequest, KeeperStatus, NexusStatusResponse,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// A request carrying a valid admin session token.
#[derive(Debug, Clone)]
pub struct AdminSession(pub SessionClaims);

impl FromRequestParts<Arc<Nexus>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, nexus: &Arc<Nexus>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, nexus)
                .await
                .map_err(|_| ApiError(ErrorCode::Unauthorized))?;
        let claims = nexus.auth.verify(bearer.token()).await?;
        Ok(Self(claims))
    }
}

/// Refuse key-dependent requests while no root key is available.
async fn require_root_key(State(nexus): State<Arc<Nexus>>, request: Request, next: Next) -> Response {
    if !nexus.store.is_available().await {
        warn!("Rejecting {} {}: root key unavailable", request.method(), request.uri().path());
        return ApiError(ErrorCode::KeyUnavailable).into_response();
    }
    next.run(request).await
}

fn login_failure(code: ErrorCode) -> (StatusCode, Json<AdminLoginResponse>) {
    (
        status_for(code),
        Json(AdminLoginResponse {
            token: None,
            err: Some(code),
        }),
    )
}

/// Handler: POST /login
async fn login(
    State(nexus): State<Arc<Nexus>>,
    body: Result<Json<AdminLoginRequest>, JsonRejection>,
) -> (StatusCode, Json<AdminLoginResponse>) {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Malformed login request: {}", e);
            nexus
                .audit
                .record(AuditEntry::failure(AuditAction::Login, ErrorCode::BadInput));
            return login_failure(ErrorCode::BadInput);
        }
    };

    match nexus.auth.login(&request.password).await {
        Ok(token) => (
            StatusCode::OK,
            Json(AdminLoginResponse {
                token: Some(token),
                err: None,
            }),
        ),
        Err(e) => login_failure(e.code()),
    }
}

/// Handler: POST /init
async fn init(
    State(nexus): State<Arc<Nexus>>,
    body: Result<Json<InitRequest>, JsonRejection>,
) -> Result<Json<EpochResponse>, ApiError> {
    let Json(request) = body.map_err(|e| {
        warn!("Malformed init request: {}", e);
        nexus
            .audit
            .record(AuditEntry::failure(AuditAction::Init, ErrorCode::BadInput));
        ApiError(ErrorCode::BadInput)
    })?;

    let epoch = nexus.bootstrap.initialize(&request.password).await?;
    Ok(Json(EpochResponse { epoch }))
}

/// Handler: GET /status
async fn status(State(nexus): State<Arc<Nexus>>) -> Json<NexusStatusResponse> {
    let epoch = nexus.store.epoch().await;
    Json(NexusStatusResponse {
        initialized: nexus.vault.has_credential().await,
        key_available: epoch.is_some(),
        epoch,
    })
}

/// Handler: GET /keepers
async fn keepers(State(nexus): State<Arc<Nexus>>, _session: AdminSession) -> Json<Vec<KeeperStatus>> {
    Json(nexus.registry.statuses().await)
}

/// Handler: POST /recover
async fn recover(
    State(nexus): State<Arc<Nexus>>,
    _session: AdminSession,
) -> Result<Json<EpochResponse>, ApiError> {
    let epoch = nexus.recovery.recover().await?;
    Ok(Json(EpochResponse { epoch }))
}

/// Handler: POST /password
async fn change_password(
    State(nexus): State<Arc<Nexus>>,
    _session: AdminSession,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body.map_err(|e| {
        warn!("Malformed password change request: {}", e);
        ApiError(ErrorCode::BadInput)
    })?;
    nexus.bootstrap.change_password(&request.password).await?;
    Ok(StatusCode::OK)
}

/// Handler: POST /root-key/rotate
async fn rotate_root_key(
    State(nexus): State<Arc<Nexus>>,
    _session: AdminSession,
) -> Result<Json<EpochResponse>, ApiError> {
    let result = nexus
        .store
        .regenerate()
        .await
        .ok_or(ErrorCode::KeyUnavailable);
    nexus
        .audit
        .record(AuditEntry::from_result(AuditAction::RotateRootKey, &result));

    let epoch = result?;
    info!(epoch, "Root key regenerated");
    nexus.replicator.push_now();
    Ok(Json(EpochResponse { epoch }))
}

/// Create the Nexus router.
pub fn nexus_router(nexus: Arc<Nexus>) -> Router {
    let key_dependent = Router::new()
        .route("/root-key/rotate", post(rotate_root_key))
        .route_layer(middleware::from_fn_with_state(nexus.clone(), require_root_key));

    Router::new()
        .route("/login", post(login))
        .route("/init", post(init))
        .route("/status", get(status))
        .route("/keepers", get(keepers))
        .route("/recover", post(recover))
        .route("/password", post(change_password))
        .merge(key_dependent)
        .layer(TraceLayer::new_for_http())
        .with_state(nexus)
}
