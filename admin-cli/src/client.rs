use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use spike_types::{
    AdminLoginRequest, AdminLoginResponse, ChangePasswordRequest, EpochResponse, ErrorResponse,
    InitRequest, KeeperStatus, NexusStatusResponse,
};
use tracing::debug;

/// Thin client for the Nexus admin API.
pub struct NexusClient {
    http: reqwest::Client,
    base_url: String,
}

impl NexusClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(%method, path, base_url = %self.base_url, "Nexus request");
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    pub async fn init(&self, password: &str) -> anyhow::Result<EpochResponse> {
        let resp = self
            .request(Method::POST, "/init")
            .json(&InitRequest {
                password: password.to_string(),
            })
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn login(&self, password: &str) -> anyhow::Result<String> {
        let resp = self
            .request(Method::POST, "/login")
            .json(&AdminLoginRequest {
                password: password.to_string(),
            })
            .send()
            .await?;
        let status = resp.status();
        debug!(%status, "Login response");
        let body: AdminLoginResponse = resp.json().await?;
        match (body.token, body.err) {
            (Some(token), None) if status.is_success() => Ok(token),
            (_, Some(code)) => Err(anyhow::anyhow!("login failed: {} ({})", code, status)),
            _ => Err(anyhow::anyhow!("login failed: unexpected response ({})", status)),
        }
    }

    pub async fn status(&self) -> anyhow::Result<NexusStatusResponse> {
        let resp = self.request(Method::GET, "/status").send().await?;
        decode(resp).await
    }

    pub async fn keepers(&self, token: &str) -> anyhow::Result<Vec<KeeperStatus>> {
        let resp = self
            .request(Method::GET, "/keepers")
            .bearer_auth(token)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn recover(&self, token: &str) -> anyhow::Result<EpochResponse> {
        let resp = self
            .request(Method::POST, "/recover")
            .bearer_auth(token)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn rotate_root_key(&self, token: &str) -> anyhow::Result<EpochResponse> {
        let resp = self
            .request(Method::POST, "/root-key/rotate")
            .bearer_auth(token)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn change_password(&self, token: &str, password: &str) -> anyhow::Result<()> {
        let resp = self
            .request(Method::POST, "/password")
            .bearer_auth(token)
            .json(&ChangePasswordRequest {
                password: password.to_string(),
            })
            .send()
            .await?;
        if resp.status() == StatusCode::OK {
            return Ok(());
        }
        Err(failure(resp).await)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> anyhow::Result<T> {
    debug!(status = %resp.status(), "Nexus response");
    if resp.status().is_success() {
        return Ok(resp.json().await?);
    }
    Err(failure(resp).await)
}

async fn failure(resp: Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => anyhow::anyhow!("request failed: {} ({})", body.err, status),
        Err(_) => anyhow::anyhow!("request failed ({})", status),
    }
}
