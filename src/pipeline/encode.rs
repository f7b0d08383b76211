//! `data:` URL encoding and decoding.
//!
//! The PDF goes to the provider as `data:application/pdf;base64,…`, and
//! inline image backends return pages the same way. Export needs the
//! reverse: split a data URL into its MIME type and bytes, then pick a file
//! extension from the bytes themselves.

use crate::error::ComicError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use tracing::debug;

/// Wrap `bytes` in a base64 `data:` URL.
pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes of {} → {} bytes base64", bytes.len(), mime_type, b64.len());
    format!("data:{mime_type};base64,{b64}")
}

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Decode a base64 `data:` URL. Returns `Ok(None)` for anything else.
pub fn decode_data_url(url: &str) -> Result<Option<DecodedDataUrl>, ComicError> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(None);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ComicError::Internal("data URL without a comma".into()))?;
    let Some(mime_type) = meta.strip_suffix(";base64") else {
        return Err(ComicError::Internal(format!(
            "unsupported data URL encoding '{meta}'"
        )));
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ComicError::Internal(format!("invalid base64 in data URL: {e}")))?;
    Ok(Some(DecodedDataUrl {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    }))
}

/// File extension for image bytes, sniffed from content and falling back
/// to the declared MIME type.
pub fn image_extension(bytes: &[u8], mime_type: &str) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::Jpeg) => "jpg",
        Ok(ImageFormat::WebP) => "webp",
        Ok(ImageFormat::Gif) => "gif",
        _ => match mime_type {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        },
    }
}
