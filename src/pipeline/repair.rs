//! Deterministic repair of almost-JSON produced by the planning model.
//!
//! ## Why repair instead of re-prompting?
//!
//! The planner is told to answer with a bare JSON array, and most of the
//! time it nearly does. What comes back in practice:
//!
//! - a `<think>…</think>` block or a "Here's the JSON:" preamble
//! - the array wrapped in a ` ```json ` fence
//! - raw newlines inside string values (invalid JSON)
//! - dialogue quotes that were never escaped: `"Nobita says "wow""`
//! - trailing commas, and booleans written as `"true"`
//!
//! A second model call costs seconds and tokens and can fail the same way.
//! The rules below cost microseconds and are each independently testable.
//!
//! ## Rule Order
//!
//! Preambles and tags go first so the array span can be found. Line breaks
//! are collapsed before quote repair because the quote scanner's lookahead
//! skips whitespace. Whitespace collapse and control-character stripping
//! come last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Run every repair rule over `input`, in order.
///
/// 1. Strip reasoning blocks, code fences and chatty preambles
/// 2. Strip remaining markup tags
/// 3. Keep only the outermost `[ … ]` span, if there is one
/// 4. Turn CR/LF/TAB into spaces
/// 5. Escape quotes embedded inside string values
/// 6. Remove trailing commas before `]` / `}`
/// 7. Unquote `"true"`, `"false"`, `"null"` used as values
/// 8. Collapse whitespace runs
/// 9. Strip control characters
pub fn clean_json_text(input: &str) -> String {
    let s = strip_preambles(input);
    let s = strip_tags(&s);
    let s = extract_array_span(&s).unwrap_or(&s).to_string();
    let s = collapse_line_breaks(&s);
    let s = escape_inner_quotes(&s);
    let s = remove_trailing_commas(&s);
    let s = unquote_literals(&s);
    let s = collapse_whitespace(&s);
    strip_control_chars(&s).trim().to_string()
}

// ── Rule 1: Strip preambles ──────────────────────────────────────────────────

static PREAMBLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<think>.*?</think>",
        r"(?i)^\s*(?:sure|okay|ok|certainly)[,!.]?\s*here(?:'s| is)[^\[\n]*",
        r"(?i)^\s*here(?:'s| is)\s+(?:the\s+|your\s+)?(?:json|page plan|plan)[^\[\n]*",
        r"(?i)^\s*(?:response|output|json)\s*:\s*",
        // Fences only at the edges; a fence inside a string value is content.
        r"(?i)^\s*```(?:json)?\s*",
        r"\s*```\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub(crate) fn strip_preambles(input: &str) -> String {
    PREAMBLE_PATTERNS
        .iter()
        .fold(input.to_string(), |s, re| re.replace_all(&s, "").into_owned())
}

// ── Rule 2: Strip tags ───────────────────────────────────────────────────────

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

fn strip_tags(input: &str) -> String {
    RE_TAG.replace_all(input, "").into_owned()
}

// ── Rule 3: Array span ───────────────────────────────────────────────────────

static RE_ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").unwrap());

/// The greedy span from the first `[` to the last `]`.
pub fn extract_array_span(input: &str) -> Option<&str> {
    RE_ARRAY_SPAN.find(input).map(|m| m.as_str())
}

// ── Rule 4: Line breaks ──────────────────────────────────────────────────────

fn collapse_line_breaks(input: &str) -> String {
    input
        .replace("\r\n", " ")
        .replace(['\n', '\r', '\t'], " ")
}

// ── Rule 5: Escape embedded quotes ───────────────────────────────────────────

/// Escape quotes that sit inside a string value without being escaped.
///
/// Outside a string, a `"` opens one. Inside, a `"` closes the string only
/// if the next non-whitespace character is `,` `}` `]` `:` or end of input;
/// any other `"` is embedded text and gets a backslash. Existing escapes
/// are copied through untouched.
pub fn escape_inner_quotes(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
        } else if c == '\\' {
            escaped = true;
            out.push(c);
        } else if c == '"' {
            if closes_string(&chars[i + 1..]) {
                in_string = false;
                out.push('"');
            } else {
                out.push_str("\\\"");
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn closes_string(rest: &[char]) -> bool {
    match rest.iter().find(|c| !c.is_whitespace()) {
        None => true,
        Some(c) => matches!(c, ',' | '}' | ']' | ':'),
    }
}

// ── Rule 6: Trailing commas ──────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([\]}])").unwrap());

fn remove_trailing_commas(input: &str) -> String {
    RE_TRAILING_COMMA.replace_all(input, "$1").into_owned()
}

// ── Rule 7: Stringified literals ─────────────────────────────────────────────

static RE_QUOTED_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#":\s*"(true|false|null)""#).unwrap());

fn unquote_literals(input: &str) -> String {
    RE_QUOTED_LITERAL.replace_all(input, ": $1").into_owned()
}

// ── Rule 8: Whitespace ───────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Replace every whitespace run with a single space.
pub fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").into_owned()
}

// ── Rule 9: Control characters ───────────────────────────────────────────────

fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(*c as u32, 0x00..=0x1F | 0x7F..=0x9F))
        .collect()
}
