//! Chat-completions payloads for the analysis, planning and inline image
//! calls.
//!
//! The PDF travels as a `data:` URL. OpenRouter accepts it as a `file`
//! part; CRSAI only accepts multimodal input through `image_url`, so the
//! same URL goes in that slot instead.

use crate::config::ComicConfig;
use crate::output::PagePlan;
use crate::pipeline::encode::data_url;
use crate::prompts;
use crate::provider::Provider;
use serde_json::{json, Value};

/// Payload for step 1: read the paper and summarise it.
pub fn analysis_payload(
    config: &ComicConfig,
    pdf: &[u8],
    mime_type: &str,
    file_name: &str,
) -> Value {
    let url = data_url(mime_type, pdf);
    let attachment = match config.text_provider {
        Provider::OpenRouter => json!({
            "type": "file",
            "file": { "filename": file_name, "file_data": url },
        }),
        Provider::Crsai => json!({
            "type": "image_url",
            "image_url": { "url": url },
        }),
    };
    let instruction = config
        .analysis_prompt
        .as_deref()
        .unwrap_or(prompts::DEFAULT_ANALYSIS_PROMPT);

    json!({
        "model": config.resolved_text_model(),
        "temperature": config.analysis_temperature,
        "stream": false,
        "messages": [
            {
                "role": "system",
                "content": [{ "type": "text", "text": prompts::ANALYSIS_SYSTEM_PROMPT }],
            },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    attachment,
                    { "type": "text", "text": prompts::attachment_note(mime_type) },
                ],
            },
        ],
    })
}

/// Payload for step 2: turn the analysis into a JSON page plan.
pub fn planning_payload(config: &ComicConfig, analysis: &str) -> Value {
    let instruction = config
        .planning_prompt
        .as_deref()
        .unwrap_or(prompts::DEFAULT_PLANNING_PROMPT);

    json!({
        "model": config.resolved_text_model(),
        "temperature": config.planning_temperature,
        "stream": false,
        "messages": [
            { "role": "system", "content": prompts::PLANNING_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": prompts::planning_user_prompt(analysis, instruction),
            },
        ],
    })
}

/// The image prompt for one page, shared by both image backends.
pub fn page_prompt(config: &ComicConfig, plan: &PagePlan, context: &str) -> String {
    let prefix = config
        .image_prompt_prefix
        .as_deref()
        .unwrap_or(prompts::DEFAULT_IMAGE_PROMPT_PREFIX);
    prompts::image_prompt(
        prefix,
        plan,
        context,
        &config.aspect_ratio,
        &config.comic_language,
    )
}

/// Payload for step 3 with an inline image backend.
pub fn inline_image_payload(config: &ComicConfig, prompt: &str) -> Value {
    json!({
        "model": config.resolved_image_model(),
        "modalities": ["image", "text"],
        "temperature": config.image_temperature,
        "stream": false,
        "image_config": { "aspect_ratio": config.aspect_ratio },
        "messages": [
            {
                "role": "user",
                "content": [{ "type": "text", "text": prompt }],
            },
        ],
    })
}
