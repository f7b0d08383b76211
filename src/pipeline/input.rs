//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! The analysis call embeds the whole document in the request, so there is
//! no need for a file on disk: local files are read and URLs downloaded
//! straight into memory. Both paths check the `%PDF` magic bytes so callers
//! get a clear error instead of a provider complaining about an unreadable
//! attachment.

use crate::error::ComicError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// MIME type sent with every uploaded document.
pub const PDF_MIME: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF";

/// A PDF ready to upload.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// File name shown to the provider, e.g. `paper.pdf`.
    pub name: String,
}

impl PdfDocument {
    /// Wrap in-memory bytes after checking the PDF magic.
    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Result<Self, ComicError> {
        let name = name.into();
        check_magic(&bytes, &name)?;
        Ok(Self {
            bytes,
            mime_type: PDF_MIME.to_string(),
            name,
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the PDF named by `input`, downloading it if it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfDocument, ComicError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.contains("://") {
        Err(ComicError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<PdfDocument, ComicError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ComicError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ComicError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = file_name(path);
    let doc = PdfDocument::from_bytes(bytes, name)?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), doc.bytes.len());
    Ok(doc)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfDocument, ComicError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| ComicError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ComicError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let doc = PdfDocument::from_bytes(bytes.to_vec(), filename_from_url(url))?;
    info!("Downloaded {} ({} bytes)", doc.name, doc.bytes.len());
    Ok(doc)
}

fn check_magic(bytes: &[u8], name: &str) -> Result<(), ComicError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    Err(ComicError::NotAPdf {
        source_name: name.to_string(),
        magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

/// Last path segment of `url` if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
