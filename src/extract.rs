//! Code-block extraction from raw generator output.
//!
//! Models are asked for exactly one fenced block, but real completions carry
//! prose, multiple fences, or no fences at all. This module recovers the
//! single most plausible runnable fragment, or nothing.

use regex::Regex;
use std::sync::OnceLock;

/// Language tags we prefer when several fenced blocks are present
const PREFERRED_TAGS: [&str; 5] = ["js", "javascript", "node", "ts", "typescript"];

/// One fenced block scanned out of the raw text
#[derive(Debug, Clone, PartialEq, Eq)]
struct FencedBlock {
    /// Lowercased language tag, empty when the fence carried none
    lang: String,
    /// Trimmed inner text
    code: String,
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"```([a-zA-Z0-9_-]*)[ \t]*\r?\n((?s).*?)```").expect("valid fence pattern")
    })
}

fn express_export() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)module\.exports\s*=\s*app|export\s+default\s+app")
            .expect("valid export pattern")
    })
}

fn component_export() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)module\.exports\s*=\s*\w+|export\s+default\s+\w+")
            .expect("valid export pattern")
    })
}

/// Content heuristic for a request/response service artifact: mentions the
/// framework and exports the app.
#[must_use]
pub fn looks_like_service(code: &str) -> bool {
    let lowered = code.to_lowercase();
    lowered.contains("express") && express_export().is_match(code)
}

/// Content heuristic for a render-once component artifact: mentions the
/// framework and exports something.
#[must_use]
pub fn looks_like_component(code: &str) -> bool {
    let lowered = code.to_lowercase();
    lowered.contains("react") && component_export().is_match(code)
}

/// Combined shape heuristic used for block selection: either artifact shape
/// counts as a signal.
#[must_use]
pub fn matches_shape(code: &str) -> bool {
    looks_like_service(code) || looks_like_component(code)
}

fn scan_blocks(text: &str) -> Vec<FencedBlock> {
    fence_pattern()
        .captures_iter(text)
        .map(|cap| FencedBlock {
            lang: cap.get(1).map_or(String::new(), |m| m.as_str().to_lowercase()),
            code: cap.get(2).map_or(String::new(), |m| m.as_str().trim().to_string()),
        })
        .collect()
}

/// Pick the most plausible block: preferred tag with shape match first, then
/// any shape match, then any preferred tag, then the longest block.
fn choose_best_block(blocks: Vec<FencedBlock>) -> Option<String> {
    if blocks.is_empty() {
        return None;
    }

    if let Some(block) = blocks
        .iter()
        .find(|b| PREFERRED_TAGS.contains(&b.lang.as_str()) && matches_shape(&b.code))
    {
        return Some(block.code.clone());
    }

    if let Some(block) = blocks.iter().find(|b| matches_shape(&b.code)) {
        return Some(block.code.clone());
    }

    if let Some(block) = blocks
        .iter()
        .find(|b| PREFERRED_TAGS.contains(&b.lang.as_str()))
    {
        return Some(block.code.clone());
    }

    blocks
        .into_iter()
        .max_by_key(|b| b.code.chars().count())
        .map(|b| b.code)
}

/// Recover the single best runnable code fragment from raw generator output.
///
/// Returns `None` when nothing recoverable is present; whitespace-only code
/// is still returned (validity is the loader's concern). When no complete
/// fence exists, falls back to the text between the first two triple-backtick
/// markers (even unterminated), then to the raw text itself if it matches the
/// shape heuristic.
#[must_use]
pub fn extract_code(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let blocks = scan_blocks(raw);
    if !blocks.is_empty() {
        return choose_best_block(blocks);
    }

    if let Some(first) = raw.find("```") {
        let after = first + 3;
        let inner = match raw[after..].find("```") {
            Some(next) => &raw[after..after + next],
            None => &raw[after..],
        };
        return Some(inner.trim().to_string());
    }

    if matches_shape(raw) {
        return Some(raw.trim().to_string());
    }

    None
}
