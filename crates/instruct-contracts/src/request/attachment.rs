use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// An image staged for the next submit, held as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    data_url: String,
    mime: String,
    byte_len: usize,
}

impl ImageAttachment {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes).context("attachment is not a recognized image")?;
        let mime = format.to_mime_type().to_string();
        let encoded = BASE64.encode(bytes);
        Ok(Self {
            data_url: format!("data:{mime};base64,{encoded}"),
            mime,
            byte_len: bytes.len(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("cannot attach {}", path.display()))
    }

    /// Accepts `data:image/<subtype>;base64,<payload>` as produced by a paste.
    pub fn from_data_url(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("data:image/") else {
            bail!("data url must start with data:image/");
        };
        let Some((subtype, payload)) = rest.split_once(";base64,") else {
            bail!("data url must be base64 encoded");
        };
        if subtype.is_empty() || !subtype.chars().all(|ch| ch.is_ascii_alphabetic()) {
            bail!("unsupported image subtype '{subtype}'");
        }
        let decoded = BASE64
            .decode(payload)
            .context("data url payload is not valid base64")?;
        Ok(Self {
            data_url: trimmed.to_string(),
            mime: format!("image/{}", subtype.to_ascii_lowercase()),
            byte_len: decoded.len(),
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}
