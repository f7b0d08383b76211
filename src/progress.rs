//! Run state and the progress-callback trait.
//!
//! [`ComicPipeline`](crate::generate::ComicPipeline) owns the single
//! [`ProcessingState`] for a run and is its only writer. Every change is
//! pushed to a [`ComicProgressCallback`] as a snapshot, so a UI never needs
//! to share the state itself.
//!
//! # Progress mapping
//!
//! | Moment | Status | Progress |
//! |--------|--------|----------|
//! | analysis starts | `Analyzing` | 5 |
//! | planning starts | `Planning` | 20 |
//! | generation starts | `GeneratingImages` | 30 |
//! | page *k* of *n* done | `GeneratingImages` | 30 + round(k / n × 70) |
//! | run finished | `Complete` | 100 |
//!
//! # Example
//!
//! ```rust
//! use paper_comic::{ComicPage, ComicProgressCallback, ProcessingState};
//!
//! struct Printer;
//!
//! impl ComicProgressCallback for Printer {
//!     fn on_state_change(&self, state: &ProcessingState) {
//!         eprintln!("{:?} {}%", state.status, state.progress);
//!     }
//!     fn on_page_complete(&self, page: &ComicPage) {
//!         eprintln!("page {} ready", page.page_number);
//!     }
//! }
//! ```

use crate::output::ComicPage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress at which analysis starts.
pub const PROGRESS_ANALYZING: u8 = 5;
/// Progress at which planning starts.
pub const PROGRESS_PLANNING: u8 = 20;
/// Progress at which page generation starts.
pub const PROGRESS_GENERATING: u8 = 30;
/// Share of the bar covered by page generation.
const GENERATION_SPAN: f64 = 70.0;

/// Where a run is.
///
/// Moves forward only: `Idle → Analyzing → Planning → GeneratingImages →
/// Complete`, with `Error` reachable from any working state. A new run
/// starts again from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Analyzing,
    Planning,
    GeneratingImages,
    Complete,
    Error,
}

impl ProcessingStatus {
    /// True for the three states in which network calls are outstanding.
    pub fn is_working(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Analyzing
                | ProcessingStatus::Planning
                | ProcessingStatus::GeneratingImages
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::Idle => "idle",
            ProcessingStatus::Analyzing => "analyzing",
            ProcessingStatus::Planning => "planning",
            ProcessingStatus::GeneratingImages => "generating images",
            ProcessingStatus::Complete => "complete",
            ProcessingStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A snapshot of run progress.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    pub status: ProcessingStatus,
    /// 0..=100
    pub progress: u8,
    pub total_steps: usize,
    pub current_step: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Overall progress once `completed` of `total` pages are done.
pub fn generation_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_GENERATING;
    }
    let done = completed.min(total) as f64 / total as f64;
    (f64::from(PROGRESS_GENERATING) + (done * GENERATION_SPAN).round()) as u8
}

/// Receives run events. All methods default to no-ops.
///
/// Calls arrive in order from the task driving the run; there is never more
/// than one in flight for a given pipeline.
pub trait ComicProgressCallback: Send + Sync {
    /// Called after every state change with the new snapshot.
    fn on_state_change(&self, state: &ProcessingState) {
        let _ = state;
    }

    /// Called once per finished page, before the next page starts.
    fn on_page_complete(&self, page: &ComicPage) {
        let _ = page;
    }
}

/// For callers that do not need events.
pub struct NoopProgressCallback;

impl ComicProgressCallback for NoopProgressCallback {}
