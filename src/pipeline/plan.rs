//! Recover a page plan from planner output that is supposed to be JSON.
//!
//! Five strategies run in a fixed order, each from the raw text, and the
//! first one that yields at least one valid [`PagePlan`] wins:
//!
//! | # | Strategy | Handles |
//! |---|----------|---------|
//! | 1 | direct parse | well-behaved output |
//! | 2 | clean, then parse | preambles, fences, bad quotes, trailing commas |
//! | 3 | extract `[…]`, then clean | trailing prose after the array |
//! | 4 | collapse all whitespace, extract, clean | pathological pretty-printing |
//! | 5 | field-level regex scan | anything that still has the three fields in order |
//!
//! Strategy 5 only matches `pageNumber`, `description`, `visualCue` in that
//! order. Output with a different field order that defeats strategies 1–4
//! is reported as a [`ComicError::PlanParse`].

use crate::error::ComicError;
use crate::output::PagePlan;
use crate::pipeline::repair::{clean_json_text, collapse_whitespace, extract_array_span};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// One self-contained attempt to turn planner output into page plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Direct,
    CleanThenParse,
    ExtractArrayThenClean,
    AggressiveCollapse,
    FieldScan,
}

impl RecoveryStrategy {
    /// All strategies in the order they are tried.
    pub const CASCADE: [RecoveryStrategy; 5] = [
        RecoveryStrategy::Direct,
        RecoveryStrategy::CleanThenParse,
        RecoveryStrategy::ExtractArrayThenClean,
        RecoveryStrategy::AggressiveCollapse,
        RecoveryStrategy::FieldScan,
    ];

    /// Run this strategy alone. `None` means "fall through".
    pub fn attempt(self, raw: &str) -> Option<Vec<PagePlan>> {
        match self {
            RecoveryStrategy::Direct => parse_json_plan(raw),
            RecoveryStrategy::CleanThenParse => parse_json_plan(&clean_json_text(raw)),
            RecoveryStrategy::ExtractArrayThenClean => {
                extract_array_span(raw).and_then(|span| parse_json_plan(&clean_json_text(span)))
            }
            RecoveryStrategy::AggressiveCollapse => {
                let flat = collapse_whitespace(&RE_BREAKS.replace_all(raw, " "));
                extract_array_span(&flat).and_then(|span| parse_json_plan(&clean_json_text(span)))
            }
            RecoveryStrategy::FieldScan => scan_fields(raw),
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryStrategy::Direct => "direct",
            RecoveryStrategy::CleanThenParse => "clean-then-parse",
            RecoveryStrategy::ExtractArrayThenClean => "extract-array-then-clean",
            RecoveryStrategy::AggressiveCollapse => "aggressive-collapse",
            RecoveryStrategy::FieldScan => "field-scan",
        };
        f.write_str(name)
    }
}

/// Parse planner output into page plans sorted by page number.
///
/// Fails with [`ComicError::PlanParse`] only when every strategy falls
/// through; the error carries a bounded preview of `raw`.
pub fn parse_plan(raw: &str) -> Result<Vec<PagePlan>, ComicError> {
    for strategy in RecoveryStrategy::CASCADE {
        match strategy.attempt(raw) {
            Some(plans) => {
                debug!("Plan recovered by {} strategy: {} page(s)", strategy, plans.len());
                return Ok(plans);
            }
            None => debug!("Plan strategy {} fell through", strategy),
        }
    }
    warn!(
        "All {} plan recovery strategies failed ({} chars of input)",
        RecoveryStrategy::CASCADE.len(),
        raw.len()
    );
    Err(ComicError::plan_parse(RecoveryStrategy::CASCADE.len(), raw))
}

// ── Validation ───────────────────────────────────────────────────────────────

fn parse_json_plan(text: &str) -> Option<Vec<PagePlan>> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    validate(&value)
}

/// Keep entries with a positive integer `pageNumber` and a non-empty
/// `description`; a missing `visualCue` becomes empty. Zero survivors, or a
/// non-array value, is a fall-through.
fn validate(value: &Value) -> Option<Vec<PagePlan>> {
    let plans: Vec<PagePlan> = value.as_array()?.iter().filter_map(plan_entry).collect();
    finalize(plans)
}

fn plan_entry(entry: &Value) -> Option<PagePlan> {
    let field = |camel: &str, snake: &str| entry.get(camel).or_else(|| entry.get(snake));

    let page_number = page_number(field("pageNumber", "page_number")?)?;
    let description = field("description", "description")?
        .as_str()
        .filter(|d| !d.trim().is_empty())?
        .to_string();
    let visual_cue = field("visualCue", "visual_cue")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(PagePlan {
        page_number,
        description,
        visual_cue,
    })
}

/// A positive integer, given as a JSON integer, an integral float, or a
/// digit string.
fn page_number(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f > 0.0).map(|f| f as u64))?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

/// Sort by page number; on duplicates the first occurrence wins.
fn finalize(mut plans: Vec<PagePlan>) -> Option<Vec<PagePlan>> {
    plans.sort_by_key(|p| p.page_number);
    plans.dedup_by_key(|p| p.page_number);
    (!plans.is_empty()).then_some(plans)
}

// ── Strategy 5: field scan ───────────────────────────────────────────────────

static RE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n\t]+").unwrap());

static RE_PLAN_FIELDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""pageNumber"\s*:\s*(\d+)\s*,\s*"description"\s*:\s*"([^"]*(?:\\"[^"]*)*)"\s*,\s*"visualCue"\s*:\s*"([^"]*(?:\\"[^"]*)*)""#,
    )
    .unwrap()
});

fn scan_fields(raw: &str) -> Option<Vec<PagePlan>> {
    let flat = RE_BREAKS.replace_all(raw, " ");
    let plans = RE_PLAN_FIELDS
        .captures_iter(&flat)
        .filter_map(|caps| {
            let page_number = caps[1].parse::<u32>().ok().filter(|n| *n > 0)?;
            let description = unescape_quotes(&caps[2]);
            if description.trim().is_empty() {
                return None;
            }
            Some(PagePlan {
                page_number,
                description,
                visual_cue: unescape_quotes(&caps[3]),
            })
        })
        .collect();
    finalize(plans)
}

fn unescape_quotes(s: &str) -> String {
    s.replace("\\\"", "\"")
}
