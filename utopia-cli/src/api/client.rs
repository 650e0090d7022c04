use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use utopia_sync::domain::{SnapshotResponse, SyncRequest, SyncResponse};
use utopia_sync::ports::Transport;
use utopia_sync::{Credentials, TransportError};

/// Talks to the sync server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Trailing slash so relative joins keep any path prefix.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid API URL: {}", base_url))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Unreachable(format!("bad URL for {path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        call_name: &str,
    ) -> Result<T, TransportError> {
        let response = request.send().await.map_err(request_error)?;

        if let Some(err) = status_error(response.status()) {
            tracing::warn!(call = call_name, status = %response.status(), "Request rejected");
            return Err(err);
        }

        let body = response.bytes().await.map_err(request_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| TransportError::Malformed(format!("{call_name}: {e}")))
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Unreachable(err.to_string())
    }
}

fn status_error(status: StatusCode) -> Option<TransportError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(TransportError::Unauthorized),
        status if status.is_success() => None,
        status => Some(TransportError::Status(status.as_u16())),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn login(&self, credentials: &Credentials) -> Result<SnapshotResponse, TransportError> {
        let request = self
            .client
            .get(self.endpoint("current-snapshot")?)
            .header(AUTHORIZATION, credentials.as_header_value());
        self.get_json(request, "GET /current-snapshot").await
    }

    async fn sync(
        &self,
        credentials: &Credentials,
        request: &SyncRequest,
    ) -> Result<SyncResponse, TransportError> {
        let request = self
            .client
            .post(self.endpoint("sync")?)
            .header(AUTHORIZATION, credentials.as_header_value())
            .json(request);
        self.get_json(request, "POST /sync").await
    }
}
