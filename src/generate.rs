//! The comic pipeline: Analyze → Plan → Generate one image per page.
//!
//! ## Why strictly sequential?
//!
//! Every step consumes the previous step's output, and pages are revealed
//! to the reader in order as they finish. Generating pages concurrently
//! would finish sooner but reorder the reveal and multiply rate-limit
//! failures, so exactly one network call per run is in flight at a time.
//!
//! ## Failure policy
//!
//! Nothing is retried across steps. The first fatal error stops the run:
//! credential failures put the state back to `Idle` so the caller can ask
//! for a new key; everything else ends in `Error`. Pages finished before
//! the failure stay readable through [`ComicPipeline::pages`].

use crate::config::{ComicConfig, ImageBackend};
use crate::credentials::{resolve_key, CredentialSource};
use crate::error::ComicError;
use crate::output::{ComicOutput, ComicPage, ComicStats, PagePlan};
use crate::pipeline::export;
use crate::pipeline::extract::{image_from, text_from};
use crate::pipeline::input::{self, PdfDocument};
use crate::pipeline::plan::parse_plan;
use crate::pipeline::poll::{Clock, DrawJobClient, TokioClock};
use crate::pipeline::request;
use crate::progress::{
    generation_progress, ComicProgressCallback, NoopProgressCallback, ProcessingState,
    ProcessingStatus, PROGRESS_ANALYZING, PROGRESS_GENERATING, PROGRESS_PLANNING,
};
use crate::provider::ProviderClient;
use crate::transport::{HttpTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// File name sent with the PDF when the caller gives none.
const DEFAULT_DOCUMENT_NAME: &str = "document.pdf";

/// Drives one comic run at a time and owns its [`ProcessingState`].
pub struct ComicPipeline {
    config: ComicConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    clock: Arc<dyn Clock>,
    state: ProcessingState,
    analysis: Option<String>,
    plan: Vec<PagePlan>,
    pages: Vec<ComicPage>,
    stats: ComicStats,
}

/// How page images get made for this run.
enum PageRenderer {
    Inline(ProviderClient),
    DrawJob(DrawJobClient),
}

impl ComicPipeline {
    /// A pipeline over HTTPS with the config's request timeout.
    pub fn new(
        config: ComicConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ComicError> {
        let transport = HttpTransport::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::with_transport(config, Arc::new(transport), credentials))
    }

    /// A pipeline over a caller-supplied transport.
    pub fn with_transport(
        config: ComicConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            clock: Arc::new(TokioClock),
            state: ProcessingState::default(),
            analysis: None,
            plan: Vec::new(),
            pages: Vec::new(),
            stats: ComicStats::default(),
        }
    }

    /// Replace the clock used between draw-job polls.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ComicConfig {
        &self.config
    }

    /// The latest state snapshot.
    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    /// Pages finished so far, in page order.
    pub fn pages(&self) -> &[ComicPage] {
        &self.pages
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    pub fn plan(&self) -> &[PagePlan] {
        &self.plan
    }

    pub fn stats(&self) -> &ComicStats {
        &self.stats
    }

    /// Discard everything from the previous run and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = ProcessingState::default();
        self.analysis = None;
        self.plan.clear();
        self.pages.clear();
        self.stats = ComicStats::default();
    }

    /// Consume the pipeline, keeping what the last run produced.
    pub fn into_output(self) -> ComicOutput {
        ComicOutput {
            analysis: self.analysis.unwrap_or_default(),
            plan: self.plan,
            pages: self.pages,
            stats: self.stats,
        }
    }

    /// Turn `pdf` into comic pages.
    ///
    /// Always starts from a clean `Idle` state. Every state change is sent
    /// to `progress`, and each page to `on_page_complete` before the next
    /// one starts.
    pub async fn run(
        &mut self,
        pdf: &[u8],
        mime_type: &str,
        progress: &dyn ComicProgressCallback,
    ) -> Result<Vec<ComicPage>, ComicError> {
        self.run_named(pdf, mime_type, DEFAULT_DOCUMENT_NAME, progress)
            .await
    }

    /// [`run`](Self::run) for a resolved document, keeping its file name.
    pub async fn run_document(
        &mut self,
        document: &PdfDocument,
        progress: &dyn ComicProgressCallback,
    ) -> Result<Vec<ComicPage>, ComicError> {
        self.run_named(&document.bytes, &document.mime_type, &document.name, progress)
            .await
    }

    async fn run_named(
        &mut self,
        pdf: &[u8],
        mime_type: &str,
        name: &str,
        progress: &dyn ComicProgressCallback,
    ) -> Result<Vec<ComicPage>, ComicError> {
        self.reset();
        let started = Instant::now();

        let result = self.execute(pdf, mime_type, name, progress).await;
        self.stats.total_duration_ms = started.elapsed().as_millis() as u64;
        self.stats.pages = self.pages.len();

        match result {
            Ok(()) => {
                info!(
                    "Comic complete: {} page(s) in {}ms",
                    self.pages.len(),
                    self.stats.total_duration_ms
                );
                Ok(self.pages.clone())
            }
            Err(e) => {
                let status = if e.is_auth() {
                    warn!("Credential failure, returning to idle: {}", e);
                    ProcessingStatus::Idle
                } else {
                    warn!("Comic run failed during {}: {}", self.state.status, e);
                    ProcessingStatus::Error
                };
                self.state.status = status;
                self.state.error = Some(e.to_string());
                progress.on_state_change(&self.state);
                Err(e)
            }
        }
    }

    async fn execute(
        &mut self,
        pdf: &[u8],
        mime_type: &str,
        name: &str,
        progress: &dyn ComicProgressCallback,
    ) -> Result<(), ComicError> {
        self.config.validate()?;

        // ── Step 1: Analyze ──────────────────────────────────────────────
        self.transition(progress, ProcessingStatus::Analyzing, PROGRESS_ANALYZING, 3, 1);
        let text_key = resolve_key(self.credentials.as_ref(), self.config.text_provider)?;
        let text_client = ProviderClient::new(
            self.config.text_provider,
            &self.config,
            &text_key,
            Arc::clone(&self.transport),
        );

        let step_start = Instant::now();
        let payload = request::analysis_payload(&self.config, pdf, mime_type, name);
        let analysis = non_empty(text_from(&text_client.chat(&payload).await?), "analysis")?;
        self.stats.analysis_ms = step_start.elapsed().as_millis() as u64;
        info!("Analysis: {} chars in {}ms", analysis.len(), self.stats.analysis_ms);
        self.analysis = Some(analysis.clone());

        // ── Step 2: Plan ─────────────────────────────────────────────────
        self.transition(progress, ProcessingStatus::Planning, PROGRESS_PLANNING, 3, 2);
        let step_start = Instant::now();
        let payload = request::planning_payload(&self.config, &analysis);
        let raw_plan = non_empty(text_from(&text_client.chat(&payload).await?), "planning")?;
        self.plan = parse_plan(&raw_plan)?;
        self.stats.planning_ms = step_start.elapsed().as_millis() as u64;
        info!("Plan: {} page(s)", self.plan.len());

        // ── Step 3: Generate ─────────────────────────────────────────────
        let total = self.plan.len();
        self.transition(
            progress,
            ProcessingStatus::GeneratingImages,
            PROGRESS_GENERATING,
            total,
            0,
        );
        let renderer = self.page_renderer()?;
        let step_start = Instant::now();

        let plan = self.plan.clone();
        for (i, page_plan) in plan.iter().enumerate() {
            self.state.current_step = i + 1;
            progress.on_state_change(&self.state);

            debug!("Generating page {} ({}/{})", page_plan.page_number, i + 1, total);
            let prompt = request::page_prompt(&self.config, page_plan, &analysis);
            let image_url = self.render_page(&renderer, page_plan, &prompt).await?;

            let page = ComicPage::from_plan(page_plan, image_url);
            self.pages.push(page);
            self.state.progress = generation_progress(i + 1, total);
            progress.on_state_change(&self.state);
            if let Some(page) = self.pages.last() {
                progress.on_page_complete(page);
            }
        }
        self.stats.generation_ms = step_start.elapsed().as_millis() as u64;

        self.state.status = ProcessingStatus::Complete;
        self.state.progress = 100;
        progress.on_state_change(&self.state);
        Ok(())
    }

    fn transition(
        &mut self,
        progress: &dyn ComicProgressCallback,
        status: ProcessingStatus,
        percent: u8,
        total_steps: usize,
        current_step: usize,
    ) {
        self.state = ProcessingState {
            status,
            progress: percent,
            total_steps,
            current_step,
            error: None,
        };
        progress.on_state_change(&self.state);
    }

    fn page_renderer(&self) -> Result<PageRenderer, ComicError> {
        let backend = self.config.image_backend;
        let key = resolve_key(self.credentials.as_ref(), backend.provider())?;
        let client = ProviderClient::new(
            backend.provider(),
            &self.config,
            &key,
            Arc::clone(&self.transport),
        );
        Ok(match backend {
            ImageBackend::Inline => PageRenderer::Inline(client),
            ImageBackend::DrawJob => PageRenderer::DrawJob(DrawJobClient::new(
                client,
                self.config.resolved_image_model(),
                self.config.aspect_ratio.clone(),
                self.config.image_size.clone(),
                self.config.poll,
                Arc::clone(&self.clock),
            )),
        })
    }

    async fn render_page(
        &self,
        renderer: &PageRenderer,
        page_plan: &PagePlan,
        prompt: &str,
    ) -> Result<String, ComicError> {
        let image = match renderer {
            PageRenderer::Inline(client) => {
                let payload = request::inline_image_payload(&self.config, prompt);
                let response = client.chat(&payload).await?;
                image_from(&response).ok_or_else(|| ComicError::ExtractionEmpty {
                    step: format!("image generation (page {})", page_plan.page_number),
                })?
            }
            PageRenderer::DrawJob(draw) => draw.generate(prompt).await?,
        };
        debug!(
            "Page {} image: {} ({})",
            page_plan.page_number,
            if image.url.starts_with("data:") { "inline" } else { "remote" },
            image.mime_type
        );
        Ok(image.url)
    }
}

fn non_empty(text: String, step: &str) -> Result<String, ComicError> {
    if text.trim().is_empty() {
        Err(ComicError::ExtractionEmpty {
            step: step.to_string(),
        })
    } else {
        Ok(text)
    }
}

// ── Convenience entry points ─────────────────────────────────────────────

/// Turn a PDF file or URL into a comic.
///
/// # Example
/// ```rust,no_run
/// use paper_comic::{generate_comic, ComicConfig, EnvCredentials};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ComicConfig::default();
/// let output = generate_comic("paper.pdf", &config, Arc::new(EnvCredentials)).await?;
/// for page in &output.pages {
///     println!("page {}: {}", page.page_number, page.description);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn generate_comic(
    input_str: impl AsRef<str>,
    config: &ComicConfig,
    credentials: Arc<dyn CredentialSource>,
) -> Result<ComicOutput, ComicError> {
    let document = input::resolve_input(input_str.as_ref(), config.request_timeout_secs).await?;
    let mut pipeline = ComicPipeline::new(config.clone(), credentials)?;
    pipeline.run_document(&document, &NoopProgressCallback).await?;
    Ok(pipeline.into_output())
}

/// Synchronous wrapper around [`generate_comic`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_comic_sync(
    input_str: impl AsRef<str>,
    config: &ComicConfig,
    credentials: Arc<dyn CredentialSource>,
) -> Result<ComicOutput, ComicError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ComicError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_comic(input_str, config, credentials))
}

/// Turn in-memory PDF bytes into a comic.
pub async fn generate_comic_from_bytes(
    bytes: Vec<u8>,
    config: &ComicConfig,
    credentials: Arc<dyn CredentialSource>,
) -> Result<ComicOutput, ComicError> {
    let document = PdfDocument::from_bytes(bytes, DEFAULT_DOCUMENT_NAME)?;
    let mut pipeline = ComicPipeline::new(config.clone(), credentials)?;
    pipeline.run_document(&document, &NoopProgressCallback).await?;
    Ok(pipeline.into_output())
}

/// Generate a comic and export it into `out_dir`.
///
/// See [`export::export_comic`] for the files written.
pub async fn generate_comic_to_dir(
    input_str: impl AsRef<str>,
    out_dir: impl AsRef<Path>,
    config: &ComicConfig,
    credentials: Arc<dyn CredentialSource>,
) -> Result<ComicStats, ComicError> {
    let output = generate_comic(input_str, config, credentials).await?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| ComicError::Internal(format!("HTTP client: {e}")))?;
    export::export_comic(&output, out_dir.as_ref(), &client).await?;
    Ok(output.stats)
}
