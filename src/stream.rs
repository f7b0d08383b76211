//! Streaming API: observe a comic run as it happens.
//!
//! ## Why stream?
//!
//! A ten-page comic takes minutes, most of it spent waiting on the image
//! backend. Streaming lets callers show each page the moment it exists and
//! drive a progress bar from the same source, instead of blocking on
//! [`crate::generate::generate_comic`] until the last page is drawn.
//!
//! Events arrive in pipeline order: state changes, each page right after the
//! state change that reports it, then `Finished`. A run that fails ends with
//! a single `Err` item and no `Finished`.

use crate::config::ComicConfig;
use crate::credentials::CredentialSource;
use crate::error::ComicError;
use crate::generate::ComicPipeline;
use crate::output::{ComicOutput, ComicPage};
use crate::pipeline::input::{self, PdfDocument};
use crate::progress::{ComicProgressCallback, ProcessingState};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

/// One observation of a running comic.
#[derive(Debug, Clone)]
pub enum ComicEvent {
    State(ProcessingState),
    Page(ComicPage),
    /// The run completed; carries everything it produced.
    Finished(Box<ComicOutput>),
}

/// A boxed stream of comic events.
pub type ComicStream = BoxStream<'static, Result<ComicEvent, ComicError>>;

struct ChannelProgress {
    tx: mpsc::UnboundedSender<Result<ComicEvent, ComicError>>,
}

impl ComicProgressCallback for ChannelProgress {
    fn on_state_change(&self, state: &ProcessingState) {
        // A dropped receiver just means nobody is watching any more.
        let _ = self.tx.send(Ok(ComicEvent::State(state.clone())));
    }

    fn on_page_complete(&self, page: &ComicPage) {
        let _ = self.tx.send(Ok(ComicEvent::Page(page.clone())));
    }
}

/// Generate a comic from a path or URL, streaming events as they happen.
///
/// Input problems (missing file, not a PDF, failed download) are returned
/// directly; everything after that arrives through the stream.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use paper_comic::{comic_stream, ComicConfig, ComicEvent, EnvCredentials};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ComicConfig::default();
/// let mut events = comic_stream("paper.pdf", &config, Arc::new(EnvCredentials)).await?;
/// while let Some(event) = events.next().await {
///     match event? {
///         ComicEvent::State(s) => println!("{} {}%", s.status, s.progress),
///         ComicEvent::Page(p) => println!("page {} ready", p.page_number),
///         ComicEvent::Finished(out) => println!("{} pages", out.pages.len()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn comic_stream(
    input_str: impl AsRef<str>,
    config: &ComicConfig,
    credentials: Arc<dyn CredentialSource>,
) -> Result<ComicStream, ComicError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming comic: {}", input_str);

    let document = input::resolve_input(input_str, config.request_timeout_secs).await?;
    let pipeline = ComicPipeline::new(config.clone(), credentials)?;
    Ok(pipeline_stream(pipeline, document))
}

/// Drive an already-built pipeline over `document` on a background task.
pub fn pipeline_stream(mut pipeline: ComicPipeline, document: PdfDocument) -> ComicStream {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let progress = ChannelProgress { tx: tx.clone() };
        let last = match pipeline.run_document(&document, &progress).await {
            Ok(_) => Ok(ComicEvent::Finished(Box::new(pipeline.into_output()))),
            Err(e) => Err(e),
        };
        if tx.send(last).is_err() {
            debug!("Comic stream receiver dropped before the run ended");
        }
    });

    UnboundedReceiverStream::new(rx).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::progress::ProcessingStatus;
    use crate::provider::Provider;
    use crate::transport::testing::ScriptedTransport;
    use serde_json::json;

    fn document() -> PdfDocument {
        PdfDocument::from_bytes(b"%PDF-1.7 body".to_vec(), "paper.pdf").unwrap()
    }

    fn pipeline(transport: ScriptedTransport) -> ComicPipeline {
        ComicPipeline::with_transport(
            ComicConfig::default(),
            Arc::new(transport),
            Arc::new(StaticCredentials::new().with_key(Provider::OpenRouter, "k")),
        )
    }

    #[tokio::test]
    async fn events_arrive_in_pipeline_order() {
        let transport = ScriptedTransport::new()
            .respond("/chat/completions", json!({"choices":[{"message":{"content":"summary"}}]}))
            .respond(
                "/chat/completions",
                json!({"choices":[{"message":{"content":"[{\"pageNumber\":1,\"description\":\"d\",\"visualCue\":\"v\"}]"}}]}),
            )
            .respond(
                "/chat/completions",
                json!({"choices":[{"message":{"images":[{"image_url":{"url":"https://cdn.test/1.png"}}]}}]}),
            );

        let events: Vec<_> = pipeline_stream(pipeline(transport), document())
            .collect()
            .await;
        let events: Vec<ComicEvent> = events.into_iter().map(Result::unwrap).collect();

        let page_at = events
            .iter()
            .position(|e| matches!(e, ComicEvent::Page(_)))
            .unwrap();
        match &events[page_at - 1] {
            ComicEvent::State(s) => assert_eq!(s.progress, 100),
            other => panic!("unexpected {other:?}"),
        }
        match events.last().unwrap() {
            ComicEvent::Finished(out) => {
                assert_eq!(out.analysis, "summary");
                assert_eq!(out.pages[0].image_url, "https://cdn.test/1.png");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_ends_stream_with_error() {
        let transport = ScriptedTransport::new()
            .respond("/chat/completions", json!({"choices":[{"message":{"content":""}}]}));

        let events: Vec<_> = pipeline_stream(pipeline(transport), document())
            .collect()
            .await;

        assert!(matches!(
            events.last(),
            Some(Err(ComicError::ExtractionEmpty { .. }))
        ));
        let error_state = events.iter().rev().find_map(|e| match e {
            Ok(ComicEvent::State(s)) => Some(s.status),
            _ => None,
        });
        assert_eq!(error_state, Some(ProcessingStatus::Error));
    }
}
