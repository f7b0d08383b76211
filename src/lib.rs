//! # paper-comic
//!
//! Turn an academic PDF into an illustrated comic using multimodal LLMs.
//!
//! ## Why this crate?
//!
//! Papers are dense; a short comic is a good way in. Multimodal models can
//! already read a PDF and draw a page, but the glue is fiddly: responses
//! come back in half a dozen shapes, "JSON" plans arrive fenced, commented
//! and half-escaped, and asynchronous image backends need polling with a
//! budget. This crate is that glue.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     read local file or download from URL, check %PDF magic
//!  ├─ 2. Analyze   whole PDF as a data: URL → narrative summary
//!  ├─ 3. Plan      summary → JSON page plan, repaired by a 5-step cascade
//!  ├─ 4. Generate  one image per page, inline or via a polled draw job
//!  └─ 5. Export    page images + comic.json + comic.md
//! ```
//!
//! Progress is reported as 5% while analyzing, 20% while planning, then
//! `30 + round(k / n × 70)` after `k` of `n` pages, and 100% at the end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_comic::{generate_comic, ComicConfig, EnvCredentials};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys from OPENROUTER_API_KEY / CRSAI_API_KEY
//!     let config = ComicConfig::default();
//!     let output = generate_comic("paper.pdf", &config, Arc::new(EnvCredentials)).await?;
//!     for page in &output.pages {
//!         println!("{}: {}", page.page_number, page.description);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper2comic` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper-comic = { version = "0.3", default-features = false }
//! ```
//!
//! ## Backends
//!
//! | Step | OpenRouter | CRSAI |
//! |------|-----------|-------|
//! | Analyze / Plan | `google/gemini-3-pro-preview` | `gemini-2.5-pro` |
//! | Images | inline `google/gemini-3-pro-image-preview` | draw job `nano-banana-pro`, polled every 3s up to 60 times |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credentials;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod stream;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ComicConfig, ComicConfigBuilder, ImageBackend, PollPolicy};
pub use credentials::{
    ApiKeyStorage, CredentialSource, EnvCredentials, KeyValidator, KeyValidity,
    LayeredCredentials, StaticCredentials,
};
pub use error::{ComicError, ErrorKind};
pub use generate::{
    generate_comic, generate_comic_from_bytes, generate_comic_sync, generate_comic_to_dir,
    ComicPipeline,
};
pub use output::{ComicOutput, ComicPage, ComicStats, PagePlan};
pub use pipeline::extract::ExtractedImage;
pub use pipeline::plan::parse_plan;
pub use progress::{ComicProgressCallback, NoopProgressCallback, ProcessingState, ProcessingStatus};
pub use provider::{Provider, ProviderClient};
pub use stream::{comic_stream, pipeline_stream, ComicEvent, ComicStream};
pub use transport::{HttpTransport, Transport};
