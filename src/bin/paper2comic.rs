//! CLI binary for paper-comic.
//!
//! A thin shim over the library crate: maps flags to `ComicConfig`, keeps
//! the local key store, and renders progress.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paper_comic::pipeline::export::export_comic;
use paper_comic::pipeline::input::resolve_input;
use paper_comic::{
    ApiKeyStorage, ComicConfig, ComicPage, ComicPipeline, ComicProgressCallback, EnvCredentials,
    ImageBackend, KeyValidator, LayeredCredentials, ProcessingState, ProcessingStatus, Provider,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while analyzing and planning, then a page bar while drawing.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn activate_bar(&self) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
    }
}

impl ComicProgressCallback for CliProgress {
    fn on_state_change(&self, state: &ProcessingState) {
        match state.status {
            ProcessingStatus::Analyzing => {
                self.bar.set_prefix("Analyzing");
                self.bar.set_message("reading the paper…");
            }
            ProcessingStatus::Planning => {
                self.bar.set_prefix("Planning");
                self.bar.set_message("laying out pages…");
            }
            ProcessingStatus::GeneratingImages => {
                if state.current_step == 0 {
                    self.activate_bar();
                    self.bar.set_prefix("Drawing");
                }
                self.bar.set_message(format!(
                    "page {}/{}",
                    state.current_step.max(1),
                    state.total_steps
                ));
            }
            ProcessingStatus::Complete => self.bar.finish_and_clear(),
            ProcessingStatus::Error | ProcessingStatus::Idle => self.bar.abandon(),
        }
        self.bar.set_position(u64::from(state.progress));
    }

    fn on_page_complete(&self, page: &ComicPage) {
        let kind = if page.is_inline() { "inline" } else { "remote" };
        self.bar.println(format!(
            "  {} Page {:>2}  {}  {}",
            green("✓"),
            page.page_number,
            dim(kind),
            truncate(&page.description, 60),
        ));
    }
}

fn truncate(s: &str, max: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max {
        format!("{}…", flat.chars().take(max - 1).collect::<String>())
    } else {
        flat
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store and validate keys once
  paper2comic keys set --openrouter sk-or-...

  # Generate a comic into ./comic
  paper2comic generate paper.pdf -o comic

  # From a URL, using CRSAI with its polled draw backend
  paper2comic generate https://arxiv.org/pdf/1706.03762 --provider crsai

  # Structured output only
  paper2comic generate paper.pdf --json > comic.json

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      OpenRouter key (used when the key store has none)
  CRSAI_API_KEY           CRSAI key (used when the key store has none)
  RUST_LOG                Override log filter, e.g. paper_comic=debug
"#;

/// Turn academic PDFs into illustrated comics.
#[derive(Parser, Debug)]
#[command(
    name = "paper2comic",
    version,
    about = "Turn academic PDFs into illustrated comics with multimodal LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPER2COMIC_VERBOSE")]
    verbose: bool,

    /// Key store location.
    #[arg(long, global = true, env = "PAPER2COMIC_KEY_FILE")]
    key_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a comic from a PDF file or URL.
    Generate(GenerateArgs),
    /// Manage stored API keys.
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output directory for page images, comic.json and comic.md.
    #[arg(short, long, env = "PAPER2COMIC_OUTPUT", default_value = "comic")]
    output: PathBuf,

    /// Text provider: openrouter or crsai. Defaults to the first validated stored key.
    #[arg(long, env = "PAPER2COMIC_PROVIDER")]
    provider: Option<Provider>,

    /// Image backend. Defaults to inline for OpenRouter, draw-job for CRSAI.
    #[arg(long, env = "PAPER2COMIC_IMAGE_BACKEND", value_enum)]
    image_backend: Option<BackendArg>,

    /// Text model override.
    #[arg(long, env = "PAPER2COMIC_TEXT_MODEL")]
    text_model: Option<String>,

    /// Image model override.
    #[arg(long, env = "PAPER2COMIC_IMAGE_MODEL")]
    image_model: Option<String>,

    /// Page aspect ratio, e.g. 2:3.
    #[arg(long, env = "PAPER2COMIC_ASPECT_RATIO")]
    aspect_ratio: Option<String>,

    /// Language for all text drawn into the pages.
    #[arg(long, env = "PAPER2COMIC_LANGUAGE")]
    language: Option<String>,

    /// Seconds between draw-job polls.
    #[arg(long, env = "PAPER2COMIC_POLL_INTERVAL", default_value_t = 3)]
    poll_interval: u64,

    /// Maximum draw-job polls per page.
    #[arg(long, env = "PAPER2COMIC_POLL_ATTEMPTS", default_value_t = 60)]
    poll_attempts: u32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PAPER2COMIC_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Print ComicOutput as JSON to stdout instead of exporting files.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER2COMIC_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Inline,
    DrawJob,
}

impl From<BackendArg> for ImageBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Inline => ImageBackend::Inline,
            BackendArg::DrawJob => ImageBackend::DrawJob,
        }
    }
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Validate and store keys. Omitted keys are kept.
    Set {
        #[arg(long)]
        openrouter: Option<String>,
        #[arg(long)]
        crsai: Option<String>,
    },
    /// Show which stored keys are valid.
    Show,
    /// Delete the key store.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Library INFO logs would fight the progress bar for the terminal.
    let progress_shown = matches!(
        &cli.command,
        Command::Generate(args) if !args.no_progress && !args.json
    );
    let filter = if cli.verbose {
        "debug"
    } else if progress_shown {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let key_file = match cli.key_file.clone().or_else(ApiKeyStorage::default_path) {
        Some(path) => path,
        None => anyhow::bail!("No config directory on this platform; pass --key-file"),
    };

    match cli.command {
        Command::Generate(args) => generate(args, key_file).await,
        Command::Keys(cmd) => keys(cmd, key_file).await,
    }
}

async fn generate(args: GenerateArgs, key_file: PathBuf) -> Result<()> {
    let store = ApiKeyStorage::load(&key_file).await;
    let config = build_config(&args, &store)?;
    let credentials = LayeredCredentials::new()
        .push(Arc::new(store))
        .push(Arc::new(EnvCredentials));

    let document = resolve_input(&args.input, config.request_timeout_secs)
        .await
        .context("Failed to load PDF")?;
    let mut pipeline = ComicPipeline::new(config.clone(), Arc::new(credentials))
        .context("Failed to set up HTTP client")?;

    let show_progress = !args.no_progress && !args.json;
    let result = if show_progress {
        let progress = CliProgress::new();
        pipeline.run_document(&document, &progress).await
    } else {
        pipeline
            .run_document(&document, &paper_comic::NoopProgressCallback)
            .await
    };

    if let Err(e) = result {
        if e.is_auth() {
            eprintln!(
                "{} {}\n  Store a key with: {}",
                red("✘"),
                e,
                bold("paper2comic keys set --openrouter <KEY>")
            );
        }
        return Err(e).context("Comic generation failed");
    }

    let output = pipeline.into_output();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let written = export_comic(&output, &args.output, &client)
        .await
        .context("Failed to export comic")?;

    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        green("✔"),
        output.stats.pages,
        output.stats.total_duration_ms,
        bold(&args.output.display().to_string()),
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "analysis {}ms · planning {}ms · images {}ms · {} files",
            output.stats.analysis_ms,
            output.stats.planning_ms,
            output.stats.generation_ms,
            written.len()
        ))
    );
    Ok(())
}

/// Map CLI args (and the stored keys) to `ComicConfig`.
fn build_config(args: &GenerateArgs, store: &ApiKeyStorage) -> Result<ComicConfig> {
    let provider = args
        .provider
        .or_else(|| store.active_provider())
        .unwrap_or(Provider::OpenRouter);
    let backend = args.image_backend.map(ImageBackend::from).unwrap_or(match provider {
        Provider::OpenRouter => ImageBackend::Inline,
        Provider::Crsai => ImageBackend::DrawJob,
    });

    let mut builder = ComicConfig::builder()
        .text_provider(provider)
        .image_backend(backend)
        .poll_interval(Duration::from_secs(args.poll_interval))
        .poll_max_attempts(args.poll_attempts)
        .request_timeout_secs(args.timeout);
    if let Some(ref m) = args.text_model {
        builder = builder.text_model(m.clone());
    }
    if let Some(ref m) = args.image_model {
        builder = builder.image_model(m.clone());
    }
    if let Some(ref r) = args.aspect_ratio {
        builder = builder.aspect_ratio(r.clone());
    }
    if let Some(ref l) = args.language {
        builder = builder.comic_language(l.clone());
    }
    builder.build().context("Invalid configuration")
}

async fn keys(cmd: KeysCommand, key_file: PathBuf) -> Result<()> {
    match cmd {
        KeysCommand::Set { openrouter, crsai } => {
            let current = ApiKeyStorage::load(&key_file).await;
            let open_router_key = openrouter.unwrap_or(current.open_router_api_key);
            let crsai_key = crsai.unwrap_or(current.crsai_api_key);

            let validator = KeyValidator::new(&ComicConfig::default())
                .context("Failed to set up HTTP client")?;
            let validity = validator.validate(&open_router_key, &crsai_key).await;
            let store = ApiKeyStorage::new(open_router_key, crsai_key, validity);
            store
                .save(&key_file)
                .await
                .context("Failed to save key store")?;
            print_keys(&store);
            if !store.has_valid_key() {
                anyhow::bail!("No key passed validation");
            }
        }
        KeysCommand::Show => print_keys(&ApiKeyStorage::load(&key_file).await),
        KeysCommand::Clear => {
            ApiKeyStorage::clear(&key_file)
                .await
                .context("Failed to clear key store")?;
            eprintln!("{} Key store cleared", green("✔"));
        }
    }
    Ok(())
}

fn print_keys(store: &ApiKeyStorage) {
    for (provider, key) in [
        (Provider::OpenRouter, &store.open_router_api_key),
        (Provider::Crsai, &store.crsai_api_key),
    ] {
        let state = if key.is_empty() {
            dim("not set")
        } else if store.is_valid.get(provider) {
            green("valid")
        } else {
            red("invalid")
        };
        println!("{:<12} {:<14} {}", provider.name(), mask(key), state);
    }
    println!("{}", dim(&format!("updated {}", store.last_updated.to_rfc3339())));
}

fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if key.chars().count() > 8 {
        format!("…{tail}")
    } else if key.is_empty() {
        "-".to_string()
    } else {
        "****".to_string()
    }
}
