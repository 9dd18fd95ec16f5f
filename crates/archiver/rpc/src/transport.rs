//! HTTP transport for JSON-RPC payloads.

use crate::TransportError;
use archiver_primitives::json;
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt::Debug, time::Duration};
use url::Url;

/// Posts a JSON-RPC payload, a single request object or a batch array, and returns the
/// decoded response body.
#[async_trait]
pub trait BatchTransport: Debug + Send + Sync {
    /// Sends `body` and returns the response body.
    async fn post(&self, body: Value) -> Result<Value, TransportError>;
}

/// [`BatchTransport`] over HTTP(S) using [`reqwest`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
}

impl HttpTransport {
    /// Creates a new [`HttpTransport`] for `url` with a per-request timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Returns the endpoint URL.
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn post(&self, body: Value) -> Result<Value, TransportError> {
        let response = self.client.post(self.url.clone()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        json::from_slice(&bytes).map_err(|err| TransportError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl<T> BatchTransport for std::sync::Arc<T>
where
    T: BatchTransport + ?Sized,
{
    async fn post(&self, body: Value) -> Result<Value, TransportError> {
        (**self).post(body).await
    }
}
