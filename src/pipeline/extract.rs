//! Pull text or an image reference out of a provider response.
//!
//! ## Why a cascade?
//!
//! The two providers, and the models behind them, disagree on where the
//! payload lives. OpenAI-shaped chat completions put text in
//! `choices[0].message.content`, but that field may be a string or an array
//! of typed parts; some gateways use the legacy `choices[0].text`; the
//! Responses API uses `output_text` or `output[].content[]`; image models
//! return `message.images`, content parts, `data[0]`, or Gemini-native
//! `inlineData`.
//!
//! Each location is a small matcher returning `Option`. Matchers run in a
//! fixed order and the first non-empty hit wins. The order matters: some
//! payloads satisfy more than one shape.
//!
//! Both functions are pure. An empty string from [`text_from`] means
//! "nothing usable", never "the model answered with nothing".

use serde_json::Value;

/// An image located in a provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// A `data:` URI or a fetchable remote URL.
    pub url: String,
    pub mime_type: String,
}

impl ExtractedImage {
    /// Wrap a URL, inferring the MIME type from a data-URI prefix or the
    /// path extension.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let mime_type = mime_from_url(&url);
        Self { url, mime_type }
    }

    fn from_base64(b64: &str, mime: Option<&str>) -> Self {
        let mime = mime.unwrap_or("image/png");
        Self {
            url: format!("data:{mime};base64,{b64}"),
            mime_type: mime.to_string(),
        }
    }
}

// ── Text ─────────────────────────────────────────────────────────────────────

/// Extract the response text, or `""` when no known location holds any.
///
/// Locations, in order:
/// 1. `choices[0].message.content` as a string
/// 2. `choices[0].message.content` as an array of parts
/// 3. `choices[0].content` / `choices[0].text`
/// 4. top-level `text`
/// 5. top-level `output_text`, joined by newlines
/// 6. `output[].content`, string or parts
pub fn text_from(response: &Value) -> String {
    let choice = first(response.get("choices"));
    let content = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"));

    content
        .and_then(non_empty_str)
        .or_else(|| content.and_then(text_from_parts))
        .or_else(|| {
            let choice = choice?;
            choice
                .get("content")
                .and_then(text_from_string_or_parts)
                .or_else(|| choice.get("text").and_then(text_from_string_or_parts))
        })
        .or_else(|| response.get("text").and_then(non_empty_str))
        .or_else(|| output_text(response))
        .or_else(|| output_content_text(response))
        .unwrap_or_default()
}

fn output_text(response: &Value) -> Option<String> {
    match response.get("output_text")? {
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n");
            (!joined.trim().is_empty()).then_some(joined)
        }
        other => non_empty_str(other),
    }
}

fn output_content_text(response: &Value) -> Option<String> {
    response
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content"))
        .find_map(text_from_string_or_parts)
}

fn text_from_string_or_parts(value: &Value) -> Option<String> {
    non_empty_str(value).or_else(|| text_from_parts(value))
}

/// First part with a non-empty `text` field, or that is itself a non-empty
/// string.
fn text_from_parts(value: &Value) -> Option<String> {
    value.as_array()?.iter().find_map(|part| match part {
        Value::String(_) => non_empty_str(part),
        Value::Object(_) => part.get("text").and_then(non_empty_str),
        _ => None,
    })
}

// ── Images ───────────────────────────────────────────────────────────────────

/// Extract the first image reference, or `None`.
///
/// Locations, in order:
/// 1. `choices[0].message.images[0]` (`{image_url:{url}}` or a bare string)
/// 2. `choices[0].message.content[]` parts of type `image_url`
/// 3. `output[].content[]` parts of type `output_image` / `image_url`, or
///    carrying inline base64
/// 4. `data[0].url` or `data[0].b64_json`
/// 5. Gemini-native `candidates[0].content.parts[].inlineData`
pub fn image_from(response: &Value) -> Option<ExtractedImage> {
    let message = first(response.get("choices")).and_then(|c| c.get("message"));

    message
        .and_then(|m| first(m.get("images")))
        .and_then(image_ref)
        .or_else(|| {
            message?
                .get("content")?
                .as_array()?
                .iter()
                .filter(|part| part_type(part) == Some("image_url"))
                .find_map(image_ref)
        })
        .or_else(|| legacy_output_image(response))
        .or_else(|| data_image(response))
        .or_else(|| gemini_inline_image(response))
}

fn legacy_output_image(response: &Value) -> Option<ExtractedImage> {
    response
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .find_map(|part| match part_type(part) {
            Some("output_image") | Some("image_url") => {
                image_ref(part).or_else(|| inline_base64(part))
            }
            _ => inline_base64(part),
        })
}

fn data_image(response: &Value) -> Option<ExtractedImage> {
    let entry = first(response.get("data"))?;
    entry
        .get("url")
        .and_then(non_empty_str)
        .map(ExtractedImage::from_url)
        .or_else(|| inline_base64(entry))
}

fn gemini_inline_image(response: &Value) -> Option<ExtractedImage> {
    first(response.get("candidates"))?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .find_map(inline_base64)
}

/// A URL given as a bare string, `{url}`, `{image_url: "..."}` or
/// `{image_url: {url}}`.
fn image_ref(value: &Value) -> Option<ExtractedImage> {
    if let Some(url) = non_empty_str(value) {
        return Some(ExtractedImage::from_url(url));
    }
    let nested = value.get("image_url");
    [nested.and_then(|n| n.get("url")), nested, value.get("url")]
        .into_iter()
        .flatten()
        .find_map(non_empty_str)
        .map(ExtractedImage::from_url)
}

/// Inline base64 under any of the field names providers use for it.
fn inline_base64(value: &Value) -> Option<ExtractedImage> {
    for key in ["b64_json", "image_base64"] {
        if let Some(b64) = value.get(key).and_then(non_empty_str) {
            let mime = value.get("mime_type").and_then(Value::as_str);
            return Some(ExtractedImage::from_base64(&b64, mime));
        }
    }
    let inline = value.get("inline_data").or_else(|| value.get("inlineData"))?;
    let b64 = inline.get("data").and_then(non_empty_str)?;
    let mime = inline
        .get("mime_type")
        .or_else(|| inline.get("mimeType"))
        .and_then(Value::as_str);
    Some(ExtractedImage::from_base64(&b64, mime))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn first(value: Option<&Value>) -> Option<&Value> {
    value?.as_array()?.first()
}

fn part_type(part: &Value) -> Option<&str> {
    part.get("type").and_then(Value::as_str)
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn mime_from_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some(mime) = rest.split([';', ',']).next().filter(|m| !m.is_empty()) {
            return mime.to_string();
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
    .to_string()
}
