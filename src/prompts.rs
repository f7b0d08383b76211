//! Prompts for the three model calls.
//!
//! Keeping every prompt here means changing the comic's voice or the
//! planner's output contract is a one-file edit, and tests can inspect the
//! exact text without a model. Callers override the analysis prompt, the
//! planning prompt and the image prefix through [`crate::config::ComicConfig`];
//! the JSON contract appended to the planning prompt is not overridable,
//! because plan recovery depends on it.

use crate::output::PagePlan;

/// System message for the analysis call.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are Doraemon and Nobita acting as playful academic tutors who break down scholarly PDFs into joyful explanations for kids.";

/// Default user instruction for the analysis call.
pub const DEFAULT_ANALYSIS_PROMPT: &str = "With Nobita and Doraemon as the main characters, guide the reader through this paper in comic form, from the basics to the deeper ideas. Summarise its core content.";

/// Default user instruction for the planning call.
pub const DEFAULT_PLANNING_PROMPT: &str = "Based on the discussion above, decide how many pages this comic study book should have, and what each page should contain.";

/// Default opening of every page image prompt.
pub const DEFAULT_IMAGE_PROMPT_PREFIX: &str =
    "Generate a full-colour comic page in the style of Doraemon, showing the following: ";

/// System message for the planning call.
pub const PLANNING_SYSTEM_PROMPT: &str = "You are a JSON generator. You MUST respond with ONLY a valid JSON array, no other text, no explanations, no thinking process. The JSON array must contain objects with these exact fields: pageNumber (number), description (string), visualCue (string).";

const PLANNING_JSON_CONTRACT: &str = r#"IMPORTANT: Respond with ONLY a valid JSON array. No thinking tags, no explanations, no markdown, no other text. Example format:
[
  {
    "pageNumber": 1,
    "description": "...",
    "visualCue": "..."
  }
]"#;

/// Text part sent after the PDF attachment in the analysis call.
pub fn attachment_note(mime_type: &str) -> String {
    format!(
        "The previous attachment is the academic PDF in data URL format ({mime_type}). Read it carefully before answering."
    )
}

/// User message for the planning call.
pub fn planning_user_prompt(analysis: &str, planning_prompt: &str) -> String {
    format!("Context: {analysis}\n{planning_prompt}\n\n{PLANNING_JSON_CONTRACT}")
}

/// Full prompt for one page image.
pub fn image_prompt(
    prefix: &str,
    plan: &PagePlan,
    context: &str,
    aspect_ratio: &str,
    language: &str,
) -> String {
    let orientation = match aspect_ratio.split_once(':') {
        Some((w, h)) if w.parse::<u32>().ok() < h.parse::<u32>().ok() => "portrait",
        Some((w, h)) if w == h => "square",
        _ => "landscape",
    };
    format!(
        "{prefix}the image for page {page} ({orientation} {aspect_ratio} for every page; all text in {language}).\n\n\
         Context: {context}\n\n\
         Page Description: {description}\n\
         Visual Scene: {visual}",
        page = plan.page_number,
        description = plan.description,
        visual = plan.visual_cue,
    )
}
