//! Submit-then-poll image generation against the CRSAI draw API.
//!
//! ```text
//! submit ──► Submitted ──► Polling ──┬──► Succeeded  (image URL)
//!                             ▲      ├──► Failed     (JobFailed)
//!                             │      ├──► NotFound   (JobNotFound)
//!                        wait interval└──► TimedOut   (JobTimeout)
//! ```
//!
//! The first poll goes out immediately; each later one waits the full
//! interval. A transient error on one poll (network failure, malformed
//! body, unexpected code) is logged and the loop continues, except on the
//! last attempt where it becomes the terminal error. Credential failures
//! are never transient.
//!
//! The whole wait is bounded by [`PollPolicy::budget`] from submission. A
//! poll request still in flight when the budget runs out is abandoned and
//! the job reported as timed out.
//!
//! Time comes from an injected [`Clock`] so tests can run all sixty
//! attempts without sleeping.

use crate::config::PollPolicy;
use crate::error::ComicError;
use crate::pipeline::extract::ExtractedImage;
use crate::provider::ProviderClient;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Draw submission endpoint.
pub const DRAW_SUBMIT_PATH: &str = "/v1/draw/nano-banana";

/// Draw result endpoint.
pub const DRAW_RESULT_PATH: &str = "/v1/draw/result";

/// Result code the backend uses for an unknown job id.
const CODE_NOT_FOUND: i64 = -22;

// ── Clock ────────────────────────────────────────────────────────────────────

/// Result of one poll request.
pub type PollFuture<'a> = BoxFuture<'a, Result<Value, ComicError>>;

/// Source of time for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);

    /// Run `request` unless `deadline` passes first; `None` on expiry.
    async fn run_until<'a>(
        &self,
        deadline: Instant,
        request: PollFuture<'a>,
    ) -> Option<Result<Value, ComicError>> {
        let remaining = deadline.saturating_duration_since(self.now());
        tokio::time::timeout(remaining, request).await.ok()
    }
}

/// Real time via `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ── Job types ────────────────────────────────────────────────────────────────

/// A submitted draw job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub submitted_at: Instant,
}

/// What one poll reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded(ExtractedImage),
    Failed(String),
    NotFound,
    /// Still `processing`/`pending`, or a status the loop does not act on.
    Running(String),
}

impl JobStatus {
    /// Interpret a `/v1/draw/result` body.
    ///
    /// `Err` means the body was unusable for this attempt (unexpected code,
    /// missing data); the caller decides whether that is fatal.
    pub fn from_response(body: &Value) -> Result<Self, ComicError> {
        let code = body.get("code").and_then(Value::as_i64);
        match code {
            Some(0) => {}
            Some(CODE_NOT_FOUND) => return Ok(JobStatus::NotFound),
            other => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("no message");
                return Err(ComicError::transport(format!(
                    "unexpected draw result code {other:?}: {message}"
                )));
            }
        }

        let data = body
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| ComicError::transport("draw result without data"))?;
        let status = data.get("status").and_then(Value::as_str).unwrap_or("");

        Ok(match status {
            "succeeded" => {
                let url = data
                    .get("results")
                    .and_then(Value::as_array)
                    .and_then(|r| r.first())
                    .and_then(|r| r.get("url"))
                    .and_then(Value::as_str)
                    .filter(|u| !u.is_empty());
                match url {
                    Some(url) => JobStatus::Succeeded(ExtractedImage::from_url(url)),
                    None => JobStatus::Running("succeeded without results".to_string()),
                }
            }
            "failed" => {
                let reason = ["failure_reason", "error"]
                    .iter()
                    .filter_map(|k| data.get(*k).and_then(Value::as_str))
                    .find(|s| !s.is_empty())
                    .unwrap_or("Unknown error");
                JobStatus::Failed(reason.to_string())
            }
            other => JobStatus::Running(other.to_string()),
        })
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Draw-job image generation with bounded polling.
#[derive(Clone)]
pub struct DrawJobClient {
    client: ProviderClient,
    model: String,
    aspect_ratio: String,
    image_size: String,
    policy: PollPolicy,
    clock: Arc<dyn Clock>,
}

impl DrawJobClient {
    pub fn new(
        client: ProviderClient,
        model: impl Into<String>,
        aspect_ratio: impl Into<String>,
        image_size: impl Into<String>,
        policy: PollPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            aspect_ratio: aspect_ratio.into(),
            image_size: image_size.into(),
            policy,
            clock,
        }
    }

    /// Submit `prompt` and return a handle to the queued job.
    pub async fn submit(&self, prompt: &str) -> Result<JobHandle, ComicError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "aspectRatio": self.aspect_ratio,
            "imageSize": self.image_size,
            "urls": [],
            "webHook": "-1",
            "shutProgress": false,
        });
        let response = self.client.post(DRAW_SUBMIT_PATH, &payload).await?;

        let code = response.get("code").and_then(Value::as_i64);
        let id = response
            .get("data")
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());

        match (code, id) {
            (Some(0), Some(id)) => {
                debug!("Draw job submitted: {}", id);
                Ok(JobHandle {
                    id: id.to_string(),
                    submitted_at: self.clock.now(),
                })
            }
            _ => {
                let message = response
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("invalid draw response (code {code:?})"));
                Err(ComicError::ProviderRejected {
                    provider: self.client.provider().name().to_string(),
                    message,
                })
            }
        }
    }

    /// Poll `handle` until it reaches a terminal state.
    pub async fn poll_until_done(&self, handle: &JobHandle) -> Result<ExtractedImage, ComicError> {
        // A deserialized policy can carry zero attempts; always poll once.
        let max = self.policy.max_attempts.max(1);
        // `None` only when the budget is too large to add to an Instant.
        let deadline = handle.submitted_at.checked_add(self.policy.budget());
        let payload = json!({ "id": handle.id });
        let mut attempts = 0;

        while attempts < max {
            if attempts > 0 {
                self.clock.sleep(self.policy.interval).await;
            }
            if deadline.is_some_and(|d| self.clock.now() >= d) {
                break;
            }
            attempts += 1;

            let request = self.client.post(DRAW_RESULT_PATH, &payload).boxed();
            let response = match deadline {
                Some(deadline) => match self.clock.run_until(deadline, request).await {
                    Some(response) => response,
                    None => {
                        warn!(
                            "Draw job {} poll {}/{} still pending at the deadline",
                            handle.id, attempts, max
                        );
                        break;
                    }
                },
                None => request.await,
            };
            let outcome = response.and_then(|body| JobStatus::from_response(&body));

            match outcome {
                Ok(JobStatus::Succeeded(image)) => {
                    info!(
                        "Draw job {} succeeded after {} poll(s)",
                        handle.id, attempts
                    );
                    return Ok(image);
                }
                Ok(JobStatus::Failed(reason)) => {
                    return Err(ComicError::JobFailed {
                        job_id: handle.id.clone(),
                        reason,
                    });
                }
                Ok(JobStatus::NotFound) => {
                    return Err(ComicError::JobNotFound {
                        job_id: handle.id.clone(),
                    });
                }
                Ok(JobStatus::Running(status)) => {
                    debug!(
                        "Draw job {} {} (poll {}/{})",
                        handle.id, status, attempts, max
                    );
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) if attempts == max => return Err(e),
                Err(e) => {
                    warn!(
                        "Draw job {} poll {}/{} failed, retrying: {}",
                        handle.id, attempts, max, e
                    );
                }
            }
        }

        let mut elapsed = self.clock.now().saturating_duration_since(handle.submitted_at);
        if deadline.is_some() {
            elapsed = elapsed.min(self.policy.budget());
        }
        Err(ComicError::JobTimeout {
            job_id: handle.id.clone(),
            attempts,
            elapsed_secs: elapsed.as_secs(),
        })
    }

    /// Submit and wait: the full draw path for one prompt.
    pub async fn generate(&self, prompt: &str) -> Result<ExtractedImage, ComicError> {
        let handle = self.submit(prompt).await?;
        self.poll_until_done(&handle).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use crate::config::ComicConfig;
    use crate::provider::Provider;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::Transport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn processing() -> Value {
        json!({"code": 0, "data": {"status": "processing"}})
    }

    fn succeeded(url: &str) -> Value {
        json!({"code": 0, "data": {"status": "succeeded", "results": [{"url": url}]}})
    }

    fn submitted() -> Value {
        json!({"code": 0, "data": {"id": "task-1"}})
    }

    fn draw_client(
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
    ) -> DrawJobClient {
        let client =
            ProviderClient::new(Provider::Crsai, &ComicConfig::default(), "key", transport);
        DrawJobClient::new(client, "nano-banana-pro", "2:3", "1K", PollPolicy::default(), clock)
    }

    #[tokio::test]
    async fn submit_sends_draw_parameters() {
        let transport = Arc::new(ScriptedTransport::new().respond(DRAW_SUBMIT_PATH, submitted()));
        let clock = Arc::new(ManualClock::new());
        let draw = draw_client(transport.clone(), clock);

        let handle = draw.submit("a robot cat").await.unwrap();
        assert_eq!(handle.id, "task-1");

        let payload = &transport.calls()[0].payload;
        assert_eq!(payload["model"], "nano-banana-pro");
        assert_eq!(payload["aspectRatio"], "2:3");
        assert_eq!(payload["imageSize"], "1K");
        assert_eq!(payload["webHook"], "-1");
        assert_eq!(payload["shutProgress"], false);
        assert_eq!(payload["urls"], json!([]));
    }

    #[tokio::test]
    async fn submit_without_id_is_rejected() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, json!({"code": -1, "message": "insufficient credits"})),
        );
        let draw = draw_client(transport, Arc::new(ManualClock::new()));
        match draw.submit("p").await.unwrap_err() {
            ComicError::ProviderRejected { message, .. } => {
                assert_eq!(message, "insufficient credits")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_poll_is_immediate() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .respond(DRAW_RESULT_PATH, succeeded("https://cdn.test/p.png")),
        );
        let clock = Arc::new(ManualClock::new());
        let image = draw_client(transport.clone(), clock.clone())
            .generate("p")
            .await
            .unwrap();
        assert_eq!(image.url, "https://cdn.test/p.png");
        assert!(clock.sleeps().is_empty());
        assert_eq!(transport.calls()[1].payload, json!({"id": "task-1"}));
    }

    #[tokio::test]
    async fn succeeds_on_the_sixtieth_attempt() {
        let mut script = ScriptedTransport::new().respond(DRAW_SUBMIT_PATH, submitted());
        for _ in 0..59 {
            script = script.respond(DRAW_RESULT_PATH, processing());
        }
        let transport = Arc::new(script.respond(DRAW_RESULT_PATH, succeeded("https://x/60.png")));
        let clock = Arc::new(ManualClock::new());

        let image = draw_client(transport.clone(), clock.clone())
            .generate("p")
            .await
            .unwrap();
        assert_eq!(image.url, "https://x/60.png");
        assert_eq!(transport.call_count(DRAW_RESULT_PATH), 60);
        assert_eq!(clock.elapsed(), Duration::from_secs(3 * 59));
    }

    #[tokio::test]
    async fn times_out_after_exactly_max_attempts() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .respond_always(DRAW_RESULT_PATH, json!({"code": 0, "data": {"status": "pending"}})),
        );
        let clock = Arc::new(ManualClock::new());
        let err = draw_client(transport.clone(), clock.clone())
            .generate("p")
            .await
            .unwrap_err();

        match err {
            ComicError::JobTimeout {
                attempts,
                elapsed_secs,
                ..
            } => {
                assert_eq!(attempts, 60);
                assert_eq!(elapsed_secs, 177);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.call_count(DRAW_RESULT_PATH), 60);
        assert!(clock.elapsed() <= PollPolicy::default().budget());
    }

    /// Answers the submit at once; every poll costs `per_poll` of clock time.
    struct SlowTransport {
        clock: Arc<ManualClock>,
        per_poll: Duration,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn post(
            &self,
            endpoint: &str,
            _payload: &Value,
            _headers: &[(String, String)],
        ) -> Result<Value, ComicError> {
            if endpoint.ends_with(DRAW_SUBMIT_PATH) {
                return Ok(submitted());
            }
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.clock.advance(self.per_poll);
            Ok(processing())
        }
    }

    /// Answers the submit at once and never answers a poll.
    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn post(
            &self,
            endpoint: &str,
            _payload: &Value,
            _headers: &[(String, String)],
        ) -> Result<Value, ComicError> {
            if endpoint.ends_with(DRAW_SUBMIT_PATH) {
                return Ok(submitted());
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn slow_polls_cannot_outlast_the_budget() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(SlowTransport {
            clock: clock.clone(),
            per_poll: Duration::from_secs(170),
            polls: AtomicUsize::new(0),
        });
        let client =
            ProviderClient::new(Provider::Crsai, &ComicConfig::default(), "key", transport.clone());
        let draw = DrawJobClient::new(client, "m", "2:3", "1K", PollPolicy::default(), clock.clone());

        match draw.generate("p").await.unwrap_err() {
            ComicError::JobTimeout {
                attempts,
                elapsed_secs,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(elapsed_secs, 180);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.polls.load(Ordering::SeqCst), 2);
        assert_eq!(clock.elapsed(), PollPolicy::default().budget());
    }

    #[tokio::test]
    async fn hung_poll_is_cut_off_at_the_deadline() {
        let client = ProviderClient::new(
            Provider::Crsai,
            &ComicConfig::default(),
            "key",
            Arc::new(HangingTransport),
        );
        let policy = PollPolicy {
            interval: Duration::from_millis(50),
            max_attempts: 2,
        };
        let draw = DrawJobClient::new(client, "m", "2:3", "1K", policy, Arc::new(TokioClock));

        let result = tokio::time::timeout(Duration::from_secs(5), draw.generate("p"))
            .await
            .expect("poll loop ignored its deadline");
        match result.unwrap_err() {
            ComicError::JobTimeout { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_attempt_policy_still_polls_once() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .respond(DRAW_RESULT_PATH, succeeded("https://x/once.png")),
        );
        let client =
            ProviderClient::new(Provider::Crsai, &ComicConfig::default(), "key", transport.clone());
        let policy = PollPolicy {
            interval: Duration::from_secs(3),
            max_attempts: 0,
        };
        let draw = DrawJobClient::new(client, "m", "2:3", "1K", policy, Arc::new(ManualClock::new()));

        let image = draw.generate("p").await.unwrap();
        assert_eq!(image.url, "https://x/once.png");
        assert_eq!(transport.call_count(DRAW_RESULT_PATH), 1);
    }

    #[tokio::test]
    async fn oversized_interval_does_not_overflow() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .respond(DRAW_RESULT_PATH, processing())
                .respond(DRAW_RESULT_PATH, succeeded("https://x/late.png")),
        );
        let client =
            ProviderClient::new(Provider::Crsai, &ComicConfig::default(), "key", transport);
        let policy = PollPolicy {
            interval: Duration::MAX / 2,
            max_attempts: 3,
        };
        let clock = Arc::new(ManualClock::new());
        let draw = DrawJobClient::new(client, "m", "2:3", "1K", policy, clock.clone());

        let image = draw.generate("p").await.unwrap();
        assert_eq!(image.url, "https://x/late.png");
        assert_eq!(clock.sleeps(), vec![Duration::MAX / 2]);
    }

    #[tokio::test]
    async fn explicit_failure_is_terminal() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .respond(DRAW_RESULT_PATH, processing())
                .respond(
                    DRAW_RESULT_PATH,
                    json!({"code": 0, "data": {"status": "failed", "failure_reason": "nsfw"}}),
                ),
        );
        let err = draw_client(transport.clone(), Arc::new(ManualClock::new()))
            .generate("p")
            .await
            .unwrap_err();
        assert!(matches!(err, ComicError::JobFailed { ref reason, .. } if reason == "nsfw"));
        assert_eq!(transport.call_count(DRAW_RESULT_PATH), 2);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .respond(DRAW_RESULT_PATH, json!({"code": -22, "message": "task not found"})),
        );
        let err = draw_client(transport, Arc::new(ManualClock::new()))
            .generate("p")
            .await
            .unwrap_err();
        assert!(matches!(err, ComicError::JobNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn transient_errors_are_absorbed() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .fail(DRAW_RESULT_PATH, "connection reset")
                .respond(DRAW_RESULT_PATH, json!({"code": 500}))
                .respond(DRAW_RESULT_PATH, succeeded("https://x/ok.png")),
        );
        let image = draw_client(transport, Arc::new(ManualClock::new()))
            .generate("p")
            .await
            .unwrap();
        assert_eq!(image.url, "https://x/ok.png");
    }

    #[tokio::test]
    async fn transient_error_on_last_attempt_is_raised() {
        let mut script = ScriptedTransport::new().respond(DRAW_SUBMIT_PATH, submitted());
        for _ in 0..59 {
            script = script.respond(DRAW_RESULT_PATH, processing());
        }
        let transport = Arc::new(script.fail(DRAW_RESULT_PATH, "gateway timeout"));
        let err = draw_client(transport, Arc::new(ManualClock::new()))
            .generate("p")
            .await
            .unwrap_err();
        match err {
            ComicError::Transport { message } => assert!(message.contains("gateway timeout")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_error_during_polling_is_not_retried() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(DRAW_SUBMIT_PATH, submitted())
                .fail_always(DRAW_RESULT_PATH, "401 Unauthorized"),
        );
        let err = draw_client(transport.clone(), Arc::new(ManualClock::new()))
            .generate("p")
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(transport.call_count(DRAW_RESULT_PATH), 1);
    }

    #[test]
    fn status_parsing() {
        assert!(matches!(
            JobStatus::from_response(&succeeded("u")).unwrap(),
            JobStatus::Succeeded(_)
        ));
        assert_eq!(
            JobStatus::from_response(&json!({"code":0,"data":{"status":"failed","error":"e"}}))
                .unwrap(),
            JobStatus::Failed("e".into())
        );
        assert_eq!(
            JobStatus::from_response(&json!({"code":0,"data":{"status":"failed"}})).unwrap(),
            JobStatus::Failed("Unknown error".into())
        );
        assert_eq!(
            JobStatus::from_response(&json!({"code":0,"data":{"status":"succeeded","results":[]}}))
                .unwrap(),
            JobStatus::Running("succeeded without results".into())
        );
        assert!(JobStatus::from_response(&json!({})).is_err());
    }
}
