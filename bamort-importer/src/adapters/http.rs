//! HTTP adapter transport

use super::client::{AdapterClient, AdapterError};
use crate::models::{AdapterMetadata, BmrtCharacter, CharacterImport, DetectResponse};
use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{header, redirect, Client, Response};
use std::time::Duration;

const USER_AGENT: &str = concat!("bamort-importer/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept from a failed adapter response
const MAX_ERROR_BODY: usize = 1024;

/// Adapter client speaking the adapter HTTP contract
///
/// Redirects are never followed so an allow-listed adapter cannot bounce
/// requests to another host.
#[derive(Debug, Clone)]
pub struct HttpAdapterClient {
    client: Client,
}

impl HttpAdapterClient {
    /// `timeout` bounds every request that does not carry its own
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, AdapterError> {
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl AdapterClient for HttpAdapterClient {
    async fn fetch_metadata(&self, base_url: &str) -> Result<AdapterMetadata, AdapterError> {
        let response = self
            .send(self.client.get(Self::endpoint(base_url, "metadata")))
            .await?;

        response
            .json::<AdapterMetadata>()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))
    }

    async fn health_check(&self, base_url: &str) -> Result<(), AdapterError> {
        self.send(self.client.get(Self::endpoint(base_url, "metadata")))
            .await
            .map(|_| ())
    }

    async fn detect(
        &self,
        base_url: &str,
        data: Bytes,
        timeout: Duration,
    ) -> Result<DetectResponse, AdapterError> {
        let request = self
            .client
            .post(Self::endpoint(base_url, "detect"))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .timeout(timeout)
            .body(data);

        self.send(request)
            .await?
            .json::<DetectResponse>()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))
    }

    async fn import(&self, base_url: &str, data: Bytes) -> Result<BmrtCharacter, AdapterError> {
        let request = self
            .client
            .post(Self::endpoint(base_url, "import"))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data);

        self.send(request)
            .await?
            .json::<BmrtCharacter>()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))
    }

    async fn export(&self, base_url: &str, character: &CharacterImport) -> Result<Vec<u8>, AdapterError> {
        let request = self
            .client
            .post(Self::endpoint(base_url, "export"))
            .json(character);

        let bytes = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
