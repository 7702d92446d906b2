//! Calls from Nexus to Keepers.
//!
//! [`KeeperChannel`] is the seam between replication/recovery logic and the
//! authenticated transport. [`HttpKeeperChannel`] talks to the Keeper custody
//! API; tests substitute in-memory channels.

use crate::key::{KeyDecodeError, RootKey, VersionedRootKey};
use crate::nexus::registry::KeeperEndpoint;
use async_trait::async_trait;
use reqwest::Client;
use spike_types::{RootKeyCacheRequest, RootKeyReadResponse, PEER_ID_HEADER};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum KeeperClientError {
    #[error("keeper unreachable: {0}")]
    Unreachable(String),

    #[error("keeper returned HTTP {0}")]
    Status(u16),

    #[error("keeper returned a malformed key: {0}")]
    MalformedKey(#[from] KeyDecodeError),

    #[error("keeper response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("keeper call timed out")]
    Timeout,
}

#[async_trait]
pub trait KeeperChannel: Send + Sync {
    /// Overwrite the Keeper's held root key.
    async fn push(&self, keeper: &KeeperEndpoint, key: &VersionedRootKey) -> Result<(), KeeperClientError>;

    /// Read the Keeper's held root key; `None` if it holds nothing yet.
    async fn show(&self, keeper: &KeeperEndpoint) -> Result<Option<VersionedRootKey>, KeeperClientError>;
}

/// Keeper channel over HTTP. Peer identity is presented in a header that the
/// mutual-TLS layer vouches for.
pub struct HttpKeeperChannel {
    http: Client,
    identity: String,
}

impl std::fmt::Debug for HttpKeeperChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKeeperChannel")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl HttpKeeperChannel {
    pub fn new(identity: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            identity: identity.into(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> KeeperClientError {
    if e.is_timeout() {
        KeeperClientError::Timeout
    } else {
        KeeperClientError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl KeeperChannel for HttpKeeperChannel {
    async fn push(&self, keeper: &KeeperEndpoint, key: &VersionedRootKey) -> Result<(), KeeperClientError> {
        let url = keeper.endpoint("/key");
        debug!(keeper = keeper.id(), epoch = key.epoch, "Pushing root key");

        let mut body = RootKeyCacheRequest {
            root_key: key.key.to_hex().as_str().to_owned(),
            epoch: key.epoch,
        };
        let sent = self
            .http
            .post(&url)
            .header(PEER_ID_HEADER, &self.identity)
            .json(&body)
            .send()
            .await;
        body.root_key.zeroize();
        let response = sent.map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(KeeperClientError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn show(&self, keeper: &KeeperEndpoint) -> Result<Option<VersionedRootKey>, KeeperClientError> {
        let url = keeper.endpoint("/key");
        debug!(keeper = keeper.id(), "Reading root key");

        let response = self
            .http
            .get(&url)
            .header(PEER_ID_HEADER, &self.identity)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(KeeperClientError::Status(response.status().as_u16()));
        }

        let body: RootKeyReadResponse = response
            .json()
            .await
            .map_err(|e| KeeperClientError::MalformedResponse(e.to_string()))?;
        decode_read_response(body)
    }
}

/// Interpret a Keeper read. An empty key means "nothing held".
pub fn decode_read_response(
    mut body: RootKeyReadResponse,
) -> Result<Option<VersionedRootKey>, KeeperClientError> {
    let result = if body.root_key.is_empty() {
        Ok(None)
    } else {
        RootKey::from_hex(&body.root_key)
            .map(|key| Some(VersionedRootKey::new(key, body.epoch)))
            .map_err(KeeperClientError::from)
    };
    body.root_key.zeroize();
    result
}
