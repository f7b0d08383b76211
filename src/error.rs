//! Error types for the paper-comic library.
//!
//! Every failure that stops a run is a [`ComicError`]. There is no
//! page-level "soft" error: a page that cannot be generated aborts the
//! remaining run, and the pages generated so far stay available through
//! [`crate::generate::ComicPipeline::pages`] and the progress callback.
//!
//! Callers that need to branch on the failure class (re-open key
//! configuration on auth errors, offer a restart on everything else) use
//! [`ComicError::kind`] instead of matching on fields.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of raw model output kept in a
/// [`ComicError::PlanParse`] preview.
pub const PLAN_PREVIEW_CHARS: usize = 200;

/// All fatal errors returned by the paper-comic library.
#[derive(Debug, Error)]
pub enum ComicError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    // ── Provider errors ───────────────────────────────────────────────────
    /// Credential missing, or rejected by the provider.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// A call succeeded but no usable text or image could be located.
    #[error("The {step} response contained no usable content")]
    ExtractionEmpty { step: String },

    /// Every plan recovery strategy failed.
    #[error("Could not recover a page plan after {strategies} strategies. Output began with: {preview:?}")]
    PlanParse { strategies: usize, preview: String },

    /// The provider answered, but refused the request.
    #[error("Provider '{provider}' rejected the request: {message}")]
    ProviderRejected { provider: String, message: String },

    /// The image backend reported an explicit failure for a job.
    #[error("Image job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// The poll budget was exhausted while the job was still running.
    #[error(
        "Image job {job_id} still running after {attempts} polls ({elapsed_secs}s). \
The image may still be generating on the server."
    )]
    JobTimeout {
        job_id: String,
        attempts: u32,
        elapsed_secs: u64,
    },

    /// The image backend does not know the job id.
    #[error("Image job {job_id} was not found by the backend")]
    JobNotFound { job_id: String },

    /// Network or HTTP failure not otherwise classified.
    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Flat classification of a [`ComicError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Auth,
    ExtractionEmpty,
    PlanParse,
    ProviderRejected,
    JobFailed,
    JobTimeout,
    JobNotFound,
    Transport,
    Output,
    Config,
    Internal,
}

/// Message fragments that providers use for bad or missing credentials.
///
/// Some providers report an unknown key as "entity not found" rather than
/// with a 401, so the text has to be inspected as well as the status.
const AUTH_PATTERNS: &[&str] = &[
    "UNAUTHENTICATED",
    "401",
    "Requested entity was not found",
    "invalid authentication credentials",
    "API Key not found",
    "Please configure your API key",
];

impl ComicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ComicError::FileNotFound { .. }
            | ComicError::PermissionDenied { .. }
            | ComicError::InvalidInput { .. }
            | ComicError::DownloadFailed { .. }
            | ComicError::DownloadTimeout { .. }
            | ComicError::NotAPdf { .. } => ErrorKind::Input,
            ComicError::AuthError { .. } => ErrorKind::Auth,
            ComicError::ExtractionEmpty { .. } => ErrorKind::ExtractionEmpty,
            ComicError::PlanParse { .. } => ErrorKind::PlanParse,
            ComicError::ProviderRejected { .. } => ErrorKind::ProviderRejected,
            ComicError::JobFailed { .. } => ErrorKind::JobFailed,
            ComicError::JobTimeout { .. } => ErrorKind::JobTimeout,
            ComicError::JobNotFound { .. } => ErrorKind::JobNotFound,
            ComicError::Transport { .. } => ErrorKind::Transport,
            ComicError::OutputWriteFailed { .. } => ErrorKind::Output,
            ComicError::InvalidConfig(_) => ErrorKind::Config,
            ComicError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the caller should re-open key configuration.
    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Build a transport error from any displayable cause.
    pub fn transport(message: impl Into<String>) -> Self {
        ComicError::Transport {
            message: message.into(),
        }
    }

    /// Classify a failed provider call.
    ///
    /// HTTP 401/403 and the known credential-failure phrasings become
    /// [`ComicError::AuthError`]; everything else is a transport error
    /// carrying the provider's own message.
    pub fn from_provider_failure(provider: &str, status: Option<u16>, message: String) -> Self {
        if matches!(status, Some(401) | Some(403)) || is_auth_message(&message) {
            ComicError::AuthError {
                provider: provider.to_string(),
                detail: message,
            }
        } else {
            ComicError::Transport { message }
        }
    }

    /// Build a [`ComicError::PlanParse`] with a bounded preview of `raw`.
    pub fn plan_parse(strategies: usize, raw: &str) -> Self {
        ComicError::PlanParse {
            strategies,
            preview: preview(raw, PLAN_PREVIEW_CHARS),
        }
    }
}

/// Does `message` look like a credential failure?
pub fn is_auth_message(message: &str) -> bool {
    AUTH_PATTERNS.iter().any(|p| message.contains(p))
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}\u{2026}")
    } else {
        head
    }
}
