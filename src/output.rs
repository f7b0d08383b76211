//! Output types: page plans, rendered pages, and run statistics.

use serde::{Deserialize, Serialize};

/// One planned comic page, before any image exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePlan {
    /// 1-based page position. Unique within a plan.
    pub page_number: u32,
    /// Narrative text shown to the reader.
    pub description: String,
    /// Scene description fed to the image model. May be empty.
    #[serde(default)]
    pub visual_cue: String,
}

/// One rendered comic page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicPage {
    /// Same as the originating [`PagePlan::page_number`].
    pub page_number: u32,
    /// A `data:` URI or a remote URL, exactly as the backend returned it.
    pub image_url: String,
    /// Copied from [`PagePlan::description`].
    pub description: String,
}

impl ComicPage {
    pub fn from_plan(plan: &PagePlan, image_url: impl Into<String>) -> Self {
        Self {
            page_number: plan.page_number,
            image_url: image_url.into(),
            description: plan.description.clone(),
        }
    }

    /// True when the image is embedded rather than hosted.
    pub fn is_inline(&self) -> bool {
        self.image_url.starts_with("data:")
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComicOutput {
    /// Text returned by the analysis step.
    pub analysis: String,
    /// The recovered plan, in page order.
    pub plan: Vec<PagePlan>,
    /// Rendered pages, in page order.
    pub pages: Vec<ComicPage>,
    pub stats: ComicStats,
}

/// Wall-clock timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicStats {
    pub analysis_ms: u64,
    pub planning_ms: u64,
    /// Sum over all pages, including any time spent polling draw jobs.
    pub generation_ms: u64,
    pub total_duration_ms: u64,
    pub pages: usize,
}
