//! Configuration types for paper-to-comic generation.
//!
//! All run behaviour is controlled through [`ComicConfig`], built via its
//! [`ComicConfigBuilder`]. Models, endpoints, prompts and the poll policy are
//! explicit fields with documented defaults; the library never reads them
//! from process-wide state, so two pipelines with different configs can run
//! side by side in one process.

use crate::error::ComicError;
use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OpenRouter API root.
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default CRSAI API root.
pub const DEFAULT_CRSAI_BASE_URL: &str = "https://grsai.dakka.com.cn";

/// Configuration for one comic generation pipeline.
///
/// Built via [`ComicConfig::builder()`] or using [`ComicConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_comic::{ComicConfig, ImageBackend};
///
/// let config = ComicConfig::builder()
///     .image_backend(ImageBackend::DrawJob)
///     .poll_max_attempts(40)
///     .build()
///     .unwrap();
/// assert_eq!(config.poll.max_attempts, 40);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComicConfig {
    /// Provider used for the analysis and planning calls. Default: OpenRouter.
    pub text_provider: Provider,

    /// How page images are produced. Default: [`ImageBackend::Inline`].
    pub image_backend: ImageBackend,

    /// OpenRouter API root, without a trailing slash.
    pub openrouter_base_url: String,

    /// CRSAI API root, without a trailing slash.
    pub crsai_base_url: String,

    /// Text model override. `None` uses [`Provider::default_text_model`].
    pub text_model: Option<String>,

    /// Image model override. `None` uses [`ImageBackend::default_model`].
    pub image_model: Option<String>,

    /// Sent as `HTTP-Referer` to OpenRouter for app attribution.
    pub app_referer: String,

    /// Sent as `X-Title` to OpenRouter for app attribution.
    pub app_title: String,

    /// Sampling temperature for the analysis call. Default: 0.7.
    pub analysis_temperature: f32,

    /// Sampling temperature for the planning call. Default: 0.3.
    ///
    /// Kept low: the planner must emit a bare JSON array and every extra
    /// degree of creativity shows up as prose around it.
    pub planning_temperature: f32,

    /// Sampling temperature for inline image generation. Default: 0.85.
    pub image_temperature: f32,

    /// Requested page aspect ratio, `W:H`. Default: `2:3` (portrait).
    pub aspect_ratio: String,

    /// Draw-job image size hint. Default: `1K`.
    pub image_size: String,

    /// Language the comic's speech bubbles and captions should use.
    pub comic_language: String,

    /// Submit-then-poll policy for [`ImageBackend::DrawJob`].
    pub poll: PollPolicy,

    /// Per-request HTTP timeout in seconds. Default: 300.
    ///
    /// The analysis call uploads the whole PDF and can take minutes on
    /// long papers.
    pub request_timeout_secs: u64,

    /// Custom analysis prompt. If None, uses the built-in default.
    pub analysis_prompt: Option<String>,

    /// Custom planning prompt. If None, uses the built-in default.
    pub planning_prompt: Option<String>,

    /// Custom image prompt prefix. If None, uses the built-in default.
    pub image_prompt_prefix: Option<String>,
}

impl Default for ComicConfig {
    fn default() -> Self {
        Self {
            text_provider: Provider::OpenRouter,
            image_backend: ImageBackend::default(),
            openrouter_base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            crsai_base_url: DEFAULT_CRSAI_BASE_URL.to_string(),
            text_model: None,
            image_model: None,
            app_referer: "http://localhost:3000".to_string(),
            app_title: "Paper Comicizer".to_string(),
            analysis_temperature: 0.7,
            planning_temperature: 0.3,
            image_temperature: 0.85,
            aspect_ratio: "2:3".to_string(),
            image_size: "1K".to_string(),
            comic_language: "Chinese".to_string(),
            poll: PollPolicy::default(),
            request_timeout_secs: 300,
            analysis_prompt: None,
            planning_prompt: None,
            image_prompt_prefix: None,
        }
    }
}

impl ComicConfig {
    /// Create a new builder for `ComicConfig`.
    pub fn builder() -> ComicConfigBuilder {
        ComicConfigBuilder {
            config: Self::default(),
        }
    }

    /// The text model actually sent to the text provider.
    pub fn resolved_text_model(&self) -> &str {
        self.text_model
            .as_deref()
            .unwrap_or_else(|| self.text_provider.default_text_model())
    }

    /// The image model actually sent to the image backend.
    pub fn resolved_image_model(&self) -> &str {
        self.image_model
            .as_deref()
            .unwrap_or_else(|| self.image_backend.default_model())
    }

    /// API root for `provider`.
    pub fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenRouter => &self.openrouter_base_url,
            Provider::Crsai => &self.crsai_base_url,
        }
    }
}

/// Builder for [`ComicConfig`].
#[derive(Debug)]
pub struct ComicConfigBuilder {
    config: ComicConfig,
}

impl ComicConfigBuilder {
    pub fn text_provider(mut self, provider: Provider) -> Self {
        self.config.text_provider = provider;
        self
    }

    pub fn image_backend(mut self, backend: ImageBackend) -> Self {
        self.config.image_backend = backend;
        self
    }

    pub fn openrouter_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openrouter_base_url = trim_base_url(url.into());
        self
    }

    pub fn crsai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.crsai_base_url = trim_base_url(url.into());
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = Some(model.into());
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = Some(model.into());
        self
    }

    pub fn app_referer(mut self, referer: impl Into<String>) -> Self {
        self.config.app_referer = referer.into();
        self
    }

    pub fn app_title(mut self, title: impl Into<String>) -> Self {
        self.config.app_title = title.into();
        self
    }

    pub fn analysis_temperature(mut self, t: f32) -> Self {
        self.config.analysis_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn planning_temperature(mut self, t: f32) -> Self {
        self.config.planning_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn image_temperature(mut self, t: f32) -> Self {
        self.config.image_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.config.aspect_ratio = ratio.into();
        self
    }

    pub fn image_size(mut self, size: impl Into<String>) -> Self {
        self.config.image_size = size.into();
        self
    }

    pub fn comic_language(mut self, language: impl Into<String>) -> Self {
        self.config.comic_language = language.into();
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    pub fn poll_max_attempts(mut self, n: u32) -> Self {
        self.config.poll.max_attempts = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.analysis_prompt = Some(prompt.into());
        self
    }

    pub fn planning_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.planning_prompt = Some(prompt.into());
        self
    }

    pub fn image_prompt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.image_prompt_prefix = Some(prefix.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ComicConfig, ComicError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl ComicConfig {
    /// Check the constraints [`ComicConfigBuilder::build`] enforces.
    ///
    /// A config loaded through serde skips the builder, so the pipeline
    /// calls this again before each run.
    pub fn validate(&self) -> Result<(), ComicError> {
        let c = self;
        if c.poll.max_attempts == 0 {
            return Err(ComicError::InvalidConfig(
                "Poll max attempts must be ≥ 1".into(),
            ));
        }
        if c.poll.interval.is_zero() {
            return Err(ComicError::InvalidConfig(
                "Poll interval must be greater than zero".into(),
            ));
        }
        if c.openrouter_base_url.is_empty() || c.crsai_base_url.is_empty() {
            return Err(ComicError::InvalidConfig(
                "Provider base URLs must not be empty".into(),
            ));
        }
        if !is_aspect_ratio(&c.aspect_ratio) {
            return Err(ComicError::InvalidConfig(format!(
                "Aspect ratio must look like 2:3, got '{}'",
                c.aspect_ratio
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(ComicError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn is_aspect_ratio(s: &str) -> bool {
    match s.split_once(':') {
        Some((w, h)) => {
            matches!(w.parse::<u32>(), Ok(n) if n > 0) && matches!(h.parse::<u32>(), Ok(n) if n > 0)
        }
        None => false,
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which backend renders the page images.
///
/// | Backend | Transport | Result |
/// |---------|-----------|--------|
/// | `Inline` | one OpenRouter chat call with image output | data URI in the response |
/// | `DrawJob` | CRSAI draw submission, then result polling | remote URL |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageBackend {
    /// Synchronous: the chat response carries the image. (default)
    #[default]
    Inline,
    /// Asynchronous: submit a draw job and poll until it finishes.
    DrawJob,
}

impl ImageBackend {
    /// The provider whose key and endpoints this backend uses.
    pub fn provider(self) -> Provider {
        match self {
            ImageBackend::Inline => Provider::OpenRouter,
            ImageBackend::DrawJob => Provider::Crsai,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ImageBackend::Inline => "google/gemini-3-pro-image-preview",
            ImageBackend::DrawJob => "nano-banana-pro",
        }
    }
}

/// Fixed-interval poll policy for asynchronous image jobs.
///
/// The first poll goes out immediately; every later poll waits the full
/// `interval`. The run never spends longer than `interval × max_attempts`
/// polling a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Wait between consecutive polls. Default: 3 s.
    pub interval: Duration,
    /// Maximum number of polls before giving up. Default: 60.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Upper bound on the time spent polling one job.
    ///
    /// Counts at least one attempt and saturates instead of overflowing.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.max(1))
    }
}
