//! Inline command extraction from planner text
//!
//! The planner steers the conversation with plain text, but two inline
//! commands are recognized by the dispatch layer around the orchestrator:
//!
//! - `*[STOP]* CONTEXT: "reason"` stops the conversation with a reason
//! - `ACTION:METHOD:PATH {json}` fires an out-of-band call at the worker API
//!
//! A third marker, the completion sentinel, is a bare literal checked by the
//! orchestrator itself. Extraction is pure pattern matching; nothing here
//! touches conversation state.

use regex::Regex;
use std::sync::OnceLock;

/// Literal token whose presence anywhere in planner output means the task
/// is finished.
pub const COMPLETION_SENTINEL: &str = "[TASK_COMPLETE]";

/// True when the planner has declared the task complete
pub fn is_complete(text: &str) -> bool {
    text.contains(COMPLETION_SENTINEL)
}

/// Inline command found in planner text
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// No recognized command
    None,

    /// Stop the conversation with the given reason
    Stop { reason: String },

    /// Out-of-band call against the worker API
    EndpointCall {
        method: String,
        path: String,
        body: Option<serde_json::Value>,
    },
}

fn stop_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The patterns are literals; compilation cannot fail at runtime.
    RE.get_or_init(|| {
        Regex::new(r#"\*\[STOP\]\*\s*CONTEXT:\s*"([^"]+)""#).expect("valid stop pattern")
    })
}

fn endpoint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"ACTION:(GET|POST|PUT|DELETE|PATCH):(/\S+)").expect("valid action pattern")
    })
}

/// Extract the first recognized command from planner text.
///
/// A stop command takes precedence over an endpoint call when both appear.
pub fn extract(text: &str) -> Directive {
    if let Some(caps) = stop_regex().captures(text) {
        return Directive::Stop {
            reason: caps[1].to_string(),
        };
    }

    if let Some(caps) = endpoint_regex().captures(text) {
        let method = caps[1].to_string();
        let path = caps[2].to_string();

        // An optional JSON payload follows the directive header.
        let rest = &text[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
        let body = rest
            .find('{')
            .and_then(|pos| extract_balanced_json(&rest[pos..]))
            .and_then(|candidate| serde_json::from_str(candidate).ok());

        return Directive::EndpointCall { method, path, body };
    }

    Directive::None
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
