//! Configuration for a background-removal session.
//!
//! Every knob lives in [`VanishConfig`], built through
//! [`VanishConfigBuilder`] so callers only set what they care about.
//!
//! The API credential is never compiled in. Either pass it at runtime
//! (`--api-key` / `REMOVE_BG_API_KEY` in the CLI), or point `endpoint` at an
//! intermediary that holds the credential and leave `api_key` unset.

use crate::error::VanishError;
use crate::model::MediaType;
use crate::observer::SessionObserver;
use std::fmt;
use std::sync::Arc;

/// The public remove.bg endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

/// 10 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Name given to downloaded results.
pub const DEFAULT_EXPORT_FILE_NAME: &str = "processed-image.png";

/// Configuration for a session and its remote client.
///
/// # Example
/// ```rust
/// use vanish::VanishConfig;
///
/// let config = VanishConfig::builder()
///     .api_key("my-key")
///     .max_file_bytes(5 * 1024 * 1024)
///     .build()
///     .unwrap();
/// assert_eq!(config.field_name, "image_file");
/// ```
#[derive(Clone)]
pub struct VanishConfig {
    /// URL the multipart request is POSTed to.
    pub endpoint: String,

    /// Static credential. `None` when an intermediary adds it.
    pub api_key: Option<String>,

    /// Header carrying [`Self::api_key`]. Default: `X-Api-Key`.
    pub api_key_header: String,

    /// Multipart field holding the source bytes. Default: `image_file`.
    pub field_name: String,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_file_bytes: u64,

    /// Media type the service returns. Default: PNG.
    pub result_media_type: MediaType,

    /// File name used when downloading the result. Default: `processed-image.png`.
    pub export_file_name: String,

    /// Overall request timeout. `None` keeps the HTTP client's default.
    pub request_timeout_secs: Option<u64>,

    /// Receives state-change notifications.
    pub observer: Option<Arc<dyn SessionObserver>>,
}

impl Default for VanishConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            api_key_header: "X-Api-Key".to_string(),
            field_name: "image_file".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            result_media_type: MediaType::Png,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
            request_timeout_secs: None,
            observer: None,
        }
    }
}

impl fmt::Debug for VanishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VanishConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_header", &self.api_key_header)
            .field("field_name", &self.field_name)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("result_media_type", &self.result_media_type)
            .field("export_file_name", &self.export_file_name)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn SessionObserver>"))
            .finish()
    }
}

impl VanishConfig {
    /// Create a new builder for `VanishConfig`.
    pub fn builder() -> VanishConfigBuilder {
        VanishConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`VanishConfig`].
#[derive(Debug)]
pub struct VanishConfigBuilder {
    config: VanishConfig,
}

impl VanishConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn api_key_header(mut self, name: impl Into<String>) -> Self {
        self.config.api_key_header = name.into();
        self
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.config.field_name = name.into();
        self
    }

    pub fn max_file_bytes(mut self, n: u64) -> Self {
        self.config.max_file_bytes = n;
        self
    }

    pub fn result_media_type(mut self, media_type: MediaType) -> Self {
        self.config.result_media_type = media_type;
        self
    }

    pub fn export_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.export_file_name = name.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<VanishConfig, VanishError> {
        let c = &self.config;

        let url = reqwest::Url::parse(&c.endpoint).map_err(|e| {
            VanishError::InvalidConfig(format!("endpoint '{}' is not a URL: {}", c.endpoint, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(VanishError::InvalidConfig(format!(
                "endpoint must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.field_name.trim().is_empty() {
            return Err(VanishError::InvalidConfig("field name must not be empty".into()));
        }
        if c.api_key_header.trim().is_empty() {
            return Err(VanishError::InvalidConfig(
                "API key header must not be empty".into(),
            ));
        }
        if c.max_file_bytes == 0 {
            return Err(VanishError::InvalidConfig("max file size must be ≥ 1 byte".into()));
        }
        if c.export_file_name.trim().is_empty()
            || c.export_file_name.contains(['/', '\\'])
            || c.export_file_name == ".."
        {
            return Err(VanishError::InvalidConfig(format!(
                "export file name must be a plain file name, got '{}'",
                c.export_file_name
            )));
        }
        Ok(self.config)
    }
}
