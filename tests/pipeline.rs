//! Pipeline integration tests against a local mock provider.
//!
//! Every provider call goes to a wiremock server, so these run offline and
//! exercise the real HTTP transport end to end.

use paper_comic::pipeline::poll::{DRAW_RESULT_PATH, DRAW_SUBMIT_PATH};
use paper_comic::{
    generate_comic_to_dir, ComicConfig, ComicError, ComicPage, ComicPipeline,
    ComicProgressCallback, ImageBackend, ProcessingState, ProcessingStatus, Provider,
    StaticCredentials,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF";
const DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUg==";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=paper_comic=debug` to see them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Which pipeline step a chat-completions request belongs to.
#[derive(Clone, Copy, PartialEq)]
enum Step {
    Analysis,
    Planning,
    Image,
}

impl Match for Step {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        let step = if body.get("modalities").is_some() {
            Step::Image
        } else if body["messages"][1]["content"].is_array() {
            Step::Analysis
        } else {
            Step::Planning
        };
        step == *self
    }
}

fn chat_text(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

fn chat_image(url: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "images": [{ "type": "image_url", "image_url": { "url": url } }] } }]
    }))
}

fn config(server: &MockServer) -> ComicConfig {
    ComicConfig::builder()
        .openrouter_base_url(server.uri())
        .crsai_base_url(server.uri())
        .poll_interval(Duration::from_millis(10))
        .request_timeout_secs(10)
        .build()
        .unwrap()
}

fn credentials() -> Arc<StaticCredentials> {
    Arc::new(
        StaticCredentials::new()
            .with_key(Provider::OpenRouter, "or-test")
            .with_key(Provider::Crsai, "crsai-test"),
    )
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<ProcessingState>>,
    pages: Mutex<Vec<ComicPage>>,
}

impl ComicProgressCallback for Recorder {
    fn on_state_change(&self, state: &ProcessingState) {
        self.states.lock().unwrap().push(state.clone());
    }
    fn on_page_complete(&self, page: &ComicPage) {
        self.pages.lock().unwrap().push(page.clone());
    }
}

// ── OpenRouter, inline images ────────────────────────────────────────────────

#[tokio::test]
async fn single_page_comic_over_http() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer or-test"))
        .and(Step::Analysis)
        .respond_with(chat_text("summary text"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Planning)
        .respond_with(chat_text(
            "```json\n[{\"pageNumber\":1,\"description\":\"d\",\"visualCue\":\"v\"}]\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Image)
        .respond_with(chat_image(DATA_URI))
        .expect(1)
        .mount(&server)
        .await;

    let mut pipeline = ComicPipeline::new(config(&server), credentials()).unwrap();
    let recorder = Recorder::default();
    let pages = pipeline
        .run(PDF, "application/pdf", &recorder)
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page_number, 1);
    assert_eq!(pages[0].image_url, DATA_URI);
    assert_eq!(pages[0].description, "d");
    assert_eq!(pipeline.state().status, ProcessingStatus::Complete);
    assert_eq!(pipeline.state().progress, 100);
    assert_eq!(recorder.pages.lock().unwrap().len(), 1);

    let progress: Vec<u8> = recorder
        .states
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.progress)
        .collect();
    assert_eq!(progress.first(), Some(&5));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
}

#[tokio::test]
async fn rejected_key_returns_pipeline_to_idle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": { "message": "No auth credentials found", "code": 401 } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut pipeline = ComicPipeline::new(config(&server), credentials()).unwrap();
    let recorder = Recorder::default();
    let err = pipeline
        .run(PDF, "application/pdf", &recorder)
        .await
        .unwrap_err();

    assert!(err.is_auth(), "got {err:?}");
    let last = recorder.states.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.status, ProcessingStatus::Idle);
    assert!(last.error.unwrap().contains("No auth credentials found"));
}

#[tokio::test]
async fn provider_error_message_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({ "error": { "message": "Rate limit exceeded" } })),
        )
        .mount(&server)
        .await;

    let mut pipeline = ComicPipeline::new(config(&server), credentials()).unwrap();
    let err = pipeline
        .run(PDF, "application/pdf", &paper_comic::NoopProgressCallback)
        .await
        .unwrap_err();

    assert!(matches!(err, ComicError::Transport { ref message } if message == "Rate limit exceeded"));
    assert_eq!(pipeline.state().status, ProcessingStatus::Error);
}

// ── CRSAI, polled draw jobs ──────────────────────────────────────────────────

#[tokio::test]
async fn draw_job_comic_over_http() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer crsai-test"))
        .and(Step::Analysis)
        .respond_with(chat_text("<think>hmm</think>summary"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(Step::Planning)
        .respond_with(chat_text(
            "Here is the plan:\n[{\"pageNumber\":1,\"description\":\"d1\",\"visualCue\":\"v1\"},]",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAW_SUBMIT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": { "id": "job-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAW_RESULT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 0, "data": { "status": "running", "progress": 40 } })),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAW_RESULT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "status": "succeeded", "results": [{ "url": "https://cdn.test/job-1.png" }] }
        })))
        .mount(&server)
        .await;

    let config = ComicConfig::builder()
        .text_provider(Provider::Crsai)
        .image_backend(ImageBackend::DrawJob)
        .openrouter_base_url(server.uri())
        .crsai_base_url(server.uri())
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let mut pipeline = ComicPipeline::new(config, credentials()).unwrap();
    let pages = pipeline
        .run(PDF, "application/pdf", &paper_comic::NoopProgressCallback)
        .await
        .unwrap();

    assert_eq!(pages[0].image_url, "https://cdn.test/job-1.png");
    assert_eq!(pages[0].description, "d1");
    assert_eq!(pipeline.analysis(), Some("<think>hmm</think>summary"));
}

#[tokio::test]
async fn failed_draw_job_stops_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Analysis)
        .respond_with(chat_text("summary"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Planning)
        .respond_with(chat_text(
            "[{\"pageNumber\":1,\"description\":\"a\",\"visualCue\":\"\"},{\"pageNumber\":2,\"description\":\"b\",\"visualCue\":\"\"}]",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAW_SUBMIT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": { "id": "job-x" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DRAW_RESULT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "status": "failed", "failure_reason": "content policy" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ComicConfig::builder()
        .image_backend(ImageBackend::DrawJob)
        .openrouter_base_url(server.uri())
        .crsai_base_url(server.uri())
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let mut pipeline = ComicPipeline::new(config, credentials()).unwrap();
    let err = pipeline
        .run(PDF, "application/pdf", &paper_comic::NoopProgressCallback)
        .await
        .unwrap_err();

    match err {
        ComicError::JobFailed { job_id, reason } => {
            assert_eq!(job_id, "job-x");
            assert_eq!(reason, "content policy");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(pipeline.pages().is_empty());
}

// ── Export ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_to_dir_downloads_remote_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Analysis)
        .respond_with(chat_text("summary"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Planning)
        .respond_with(chat_text(
            "[{\"pageNumber\":1,\"description\":\"only page\",\"visualCue\":\"v\"}]",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(Step::Image)
        .respond_with(chat_image(&format!("{}/img/1.jpg", server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/1.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F']),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut pdf = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    pdf.write_all(PDF).unwrap();
    let out = tempfile::tempdir().unwrap();

    let stats = generate_comic_to_dir(
        pdf.path().to_str().unwrap(),
        out.path(),
        &config(&server),
        credentials(),
    )
    .await
    .unwrap();

    assert_eq!(stats.pages, 1);
    assert!(out.path().join("page-001.jpg").exists());
    assert!(out.path().join("comic.json").exists());
    let md = std::fs::read_to_string(out.path().join("comic.md")).unwrap();
    assert!(md.contains("only page"));
}
