//! Binary ↔ text codec: raw image bytes ⇄ `data:<mime>;base64,<payload>`.
//!
//! A data URL is self-describing (it carries the MIME type) and can be
//! handed straight to anything that renders images from a URL, which is
//! what both the preview and the processed result are used for.

use crate::error::CodecError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A `data:` URL holding an image.
#[derive(Clone, PartialEq, Eq)]
pub struct DataUrl(String);

impl DataUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// MIME type between `data:` and `;base64,`.
    pub fn mime(&self) -> &str {
        self.0
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.split_once(BASE64_MARKER))
            .map(|(mime, _)| mime)
            .unwrap_or_default()
    }

    /// Decode the payload back into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        decode(&self.0).map(|(_, bytes)| bytes)
    }

    /// Parse and validate an existing data URL.
    pub fn parse(text: impl Into<String>) -> Result<Self, CodecError> {
        let text = text.into();
        decode(&text)?;
        Ok(DataUrl(text))
    }
}

impl fmt::Debug for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads run to megabytes; show the header and length only.
        write!(f, "DataUrl({}, {} chars)", self.mime(), self.0.len())
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode bytes as a data URL. Total: every input, including an empty one,
/// produces a complete URL.
pub fn encode(bytes: &[u8], mime: &str) -> DataUrl {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} chars base64 ({})", bytes.len(), b64.len(), mime);

    let mut url = String::with_capacity(SCHEME.len() + mime.len() + BASE64_MARKER.len() + b64.len());
    url.push_str(SCHEME);
    url.push_str(mime);
    url.push_str(BASE64_MARKER);
    url.push_str(&b64);
    DataUrl(url)
}

/// Read a stream to the end, then encode it.
///
/// Nothing is encoded until the whole stream has been read, so a read
/// failure yields [`CodecError::Read`] rather than a truncated URL.
pub async fn encode_reader<R>(mut reader: R, mime: &str) -> Result<DataUrl, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|e| CodecError::Read {
            reason: e.to_string(),
        })?;
    Ok(encode(&buf, mime))
}

/// Split a data URL into its MIME type and decoded bytes.
pub fn decode(text: &str) -> Result<(String, Vec<u8>), CodecError> {
    let rest = text.strip_prefix(SCHEME).ok_or_else(|| CodecError::Malformed {
        detail: "missing 'data:' scheme".into(),
    })?;
    let (mime, payload) = rest
        .split_once(BASE64_MARKER)
        .ok_or_else(|| CodecError::Malformed {
            detail: "missing ';base64,' marker".into(),
        })?;
    if mime.is_empty() {
        return Err(CodecError::Malformed {
            detail: "empty MIME type".into(),
        });
    }
    let bytes = STANDARD.decode(payload)?;
    Ok((mime.to_string(), bytes))
}
