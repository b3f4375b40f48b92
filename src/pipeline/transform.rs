//! Remote transform: send the source image to the background-removal
//! service and get the processed bytes back.
//!
//! The orchestrator only sees the [`Transformer`] capability, so it can be
//! driven by [`RemoveBgClient`] in production and by a fake in tests.
//!
//! One attempt per call. There is no retry, no idempotency key and no
//! timeout beyond the HTTP client's default unless one is configured.
//! Duplicate calls are prevented upstream by the session's trigger guard.

use crate::config::VanishConfig;
use crate::error::TransformError;
use crate::model::SourceFile;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// Turns a source image into a processed image.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Run one transform attempt and return the raw result bytes.
    async fn transform(&self, source: &SourceFile) -> Result<Vec<u8>, TransformError>;
}

/// HTTP client for remove.bg and API-compatible endpoints.
#[derive(Debug, Clone)]
pub struct RemoveBgClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    field_name: String,
    credential: Option<(HeaderName, HeaderValue)>,
}

impl RemoveBgClient {
    /// Build a client from a validated config.
    pub fn new(config: &VanishConfig) -> Result<Self, crate::error::VanishError> {
        use crate::error::VanishError;

        let endpoint = reqwest::Url::parse(&config.endpoint)
            .map_err(|e| VanishError::InvalidConfig(format!("endpoint: {e}")))?;

        let credential = match &config.api_key {
            Some(key) => {
                let name = HeaderName::from_bytes(config.api_key_header.as_bytes())
                    .map_err(|e| VanishError::InvalidConfig(format!("API key header: {e}")))?;
                let mut value = HeaderValue::from_str(key)
                    .map_err(|_| VanishError::InvalidConfig("API key contains invalid characters".into()))?;
                value.set_sensitive(true);
                Some((name, value))
            }
            None => {
                info!("No API key configured; assuming {} adds credentials", endpoint);
                None
            }
        };

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| VanishError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            field_name: config.field_name.clone(),
            credential,
        })
    }

    /// Assemble the multipart request without sending it.
    pub fn build_request(&self, source: &SourceFile) -> Result<reqwest::Request, TransformError> {
        let part = Part::bytes(source.bytes.clone())
            .file_name(source.name.clone())
            .mime_str(source.media_type.mime())
            .map_err(|e| TransformError::Request {
                reason: e.to_string(),
            })?;
        let form = Form::new().part(self.field_name.clone(), part);

        let mut req = self
            .http
            .post(self.endpoint.clone())
            .header(ACCEPT, "image/*")
            .multipart(form);
        if let Some((name, value)) = &self.credential {
            req = req.header(name.clone(), value.clone());
        }
        req.build().map_err(|e| TransformError::Request {
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Transformer for RemoveBgClient {
    async fn transform(&self, source: &SourceFile) -> Result<Vec<u8>, TransformError> {
        let start = Instant::now();
        let request = self.build_request(source)?;
        info!(
            "Uploading '{}' ({} bytes, {}) to {}",
            source.name,
            source.size(),
            source.media_type,
            self.endpoint
        );

        let response = self.http.execute(request).await.map_err(|e| {
            warn!("Transform request failed: {}", e);
            TransformError::Request {
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            // The service's error payload is not interpreted.
            warn!("Transform service returned HTTP {}", status);
            return Err(TransformError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read transform response: {}", e);
            TransformError::Body {
                reason: e.to_string(),
            }
        })?;
        if body.is_empty() {
            return Err(TransformError::EmptyBody);
        }

        debug!(
            "Transform returned {} bytes in {}ms",
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(body.to_vec())
    }
}
