//! JSON salvage for model replies.
//!
//! The model is asked for a bare `{"references": [...]}` object but may
//! wrap it in code fences or chatter. Attempts run in order and the first
//! one that parses wins:
//!
//! 1. strip every code-fence marker, trim, parse the remainder
//! 2. parse the slice from the first `{` to the last `}`
//!
//! When both miss, the error carries the first 200 characters of the reply.

use super::ExtractionResult;
use crate::error::ExtractError;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

/// Characters of the raw reply kept in a parse error
pub const EXCERPT_CHARS: usize = 200;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```json\s*").expect("valid fence regex"));
static PLAIN_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```\s*").expect("valid fence regex"));

#[derive(Debug, Deserialize)]
struct ReferencePayload {
    #[serde(default)]
    references: Option<Vec<String>>,
}

type Attempt = fn(&str) -> Result<ReferencePayload, String>;

const ATTEMPTS: &[(&str, Attempt)] = &[("unfenced", parse_unfenced), ("brace-slice", parse_brace_slice)];

fn parse_unfenced(reply: &str) -> Result<ReferencePayload, String> {
    let without_json = JSON_FENCE.replace_all(reply, "");
    let cleaned = PLAIN_FENCE.replace_all(&without_json, "");
    serde_json::from_str(cleaned.trim()).map_err(|e| e.to_string())
}

fn parse_brace_slice(reply: &str) -> Result<ReferencePayload, String> {
    let start = reply.find('{').ok_or("no opening brace")?;
    let end = reply.rfind('}').ok_or("no closing brace")?;
    if end < start {
        return Err("no brace-delimited object".to_string());
    }
    serde_json::from_str(&reply[start..=end]).map_err(|e| e.to_string())
}

/// Recover the reference list from a free-form model reply.
pub fn salvage(reply: &str) -> Result<ExtractionResult, ExtractError> {
    for (name, attempt) in ATTEMPTS {
        match attempt(reply) {
            Ok(payload) => {
                debug!("Salvaged model reply with {} attempt", name);
                return Ok(ExtractionResult::new(payload.references.unwrap_or_default()));
            }
            Err(e) => debug!("Salvage attempt {} missed: {}", name, e),
        }
    }

    Err(ExtractError::ResponseParse {
        excerpt: reply.chars().take(EXCERPT_CHARS).collect(),
    })
}
