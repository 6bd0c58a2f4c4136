//! HTTP client for communicating with a compute agent.
//!
//! The controller never talks raw reqwest; everything goes through the
//! [`ComputeClient`] trait so node orchestration can be tested against a
//! scripted compute.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use netlab_core::ComputeId;
use serde_json::Value;

use crate::config::ComputeConfig;
use crate::error::{ComputeError, Result};

/// Timeout policy for a single compute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTimeout {
    /// Use the client's configured default timeout.
    Default,
    /// Use a fixed per-request timeout, ignoring the default.
    Fixed(Duration),
    /// No timeout at all. Used for image uploads, whose duration is
    /// bounded only by the image size and link speed.
    Unbounded,
}

/// A successful response from a compute agent.
#[derive(Debug, Clone)]
pub struct ComputeResponse {
    /// HTTP status code (always 2xx; failures become errors).
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body is empty or not JSON.
    pub body: Value,
}

/// Trait for compute communication.
///
/// Abstracts the compute REST API so node orchestration can be exercised
/// against mock computes in tests.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// The compute's identifier, as serialized into node payloads.
    fn id(&self) -> &ComputeId;

    /// The host clients should use to reach consoles on this compute.
    fn host(&self) -> &str;

    /// Issue a POST request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn post(
        &self,
        path: &str,
        body: Option<Value>,
        timeout: RequestTimeout,
    ) -> Result<ComputeResponse>;

    /// Issue a PUT request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn put(&self, path: &str, body: Value, timeout: RequestTimeout)
        -> Result<ComputeResponse>;

    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn get(&self, path: &str, timeout: RequestTimeout) -> Result<ComputeResponse>;

    /// Issue a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn delete(&self, path: &str) -> Result<ComputeResponse>;

    /// Upload a local file as a raw POST body, with no timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, on transport failure,
    /// or on a non-success status.
    async fn upload(&self, path: &str, source: &Path) -> Result<ComputeResponse>;
}

/// reqwest-backed compute client.
pub struct HttpComputeClient {
    id: ComputeId,
    host: String,
    base_url: String,
    default_timeout: Duration,
    client: reqwest::Client,
}

impl HttpComputeClient {
    /// Create a client from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `ComputeError::InvalidBaseUrl` if the base URL does not
    /// parse or has no host component.
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        let url = reqwest::Url::parse(&config.base_url).map_err(|_| {
            ComputeError::InvalidBaseUrl {
                url: config.base_url.clone(),
            }
        })?;
        let host = match &config.console_host {
            Some(host) => host.clone(),
            None => url
                .host_str()
                .ok_or_else(|| ComputeError::InvalidBaseUrl {
                    url: config.base_url.clone(),
                })?
                .to_string(),
        };

        // No global timeout on the client itself: image uploads must be
        // able to run unbounded, so timeouts are applied per request.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ComputeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            id: ComputeId::new(config.base_url.trim_end_matches('/')),
            host,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_timeout: config.request_timeout(),
            client,
        })
    }

    /// The base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn apply_timeout(
        &self,
        request: reqwest::RequestBuilder,
        timeout: RequestTimeout,
    ) -> reqwest::RequestBuilder {
        match timeout {
            RequestTimeout::Default => request.timeout(self.default_timeout),
            RequestTimeout::Fixed(duration) => request.timeout(duration),
            RequestTimeout::Unbounded => request,
        }
    }

    async fn dispatch(&self, request: reqwest::RequestBuilder) -> Result<ComputeResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| ComputeError::Transport(format!("compute request failed: {e}")))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ComputeError::Transport(format!("failed to read response body: {e}")))?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        if (200..300).contains(&status) {
            Ok(ComputeResponse { status, body })
        } else {
            Err(error_for(status, &body))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Map a non-success response to the error taxonomy.
///
/// A 409 carrying `exception == "ImageMissingError"` and an image name is
/// the one recoverable failure; everything else is reported as-is.
fn error_for(status: u16, body: &Value) -> ComputeError {
    if status == 409 {
        let exception = body.get("exception").and_then(Value::as_str);
        let image = body.get("image").and_then(Value::as_str);
        if let (Some("ImageMissingError"), Some(image)) = (exception, image) {
            return ComputeError::ImageMissing {
                image: image.to_string(),
            };
        }
    }

    let detail = body
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), ToString::to_string);

    ComputeError::Http { status, detail }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    fn id(&self) -> &ComputeId {
        &self.id
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn post(
        &self,
        path: &str,
        body: Option<Value>,
        timeout: RequestTimeout,
    ) -> Result<ComputeResponse> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        tracing::debug!(path, "POST to compute");
        self.dispatch(self.apply_timeout(request, timeout)).await
    }

    async fn put(
        &self,
        path: &str,
        body: Value,
        timeout: RequestTimeout,
    ) -> Result<ComputeResponse> {
        let request = self.client.put(self.url(path)).json(&body);
        tracing::debug!(path, "PUT to compute");
        self.dispatch(self.apply_timeout(request, timeout)).await
    }

    async fn get(&self, path: &str, timeout: RequestTimeout) -> Result<ComputeResponse> {
        let request = self.client.get(self.url(path));
        tracing::debug!(path, "GET to compute");
        self.dispatch(self.apply_timeout(request, timeout)).await
    }

    async fn delete(&self, path: &str) -> Result<ComputeResponse> {
        let request = self.client.delete(self.url(path));
        tracing::debug!(path, "DELETE to compute");
        self.dispatch(self.apply_timeout(request, RequestTimeout::Default))
            .await
    }

    async fn upload(&self, path: &str, source: &Path) -> Result<ComputeResponse> {
        let bytes = tokio::fs::read(source).await?;
        tracing::info!(path, size = bytes.len(), "uploading image to compute");
        let request = self.client.post(self.url(path)).body(bytes);
        // Deliberately no timeout: large images over slow links.
        self.dispatch(request).await
    }
}
