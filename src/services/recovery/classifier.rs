//! Error classification over opaque vendor error shapes.
//!
//! Errors arrive as strings, structured objects, or nested wrappers of
//! undocumented shape. Rather than pre-declaring vendor schemas, a small
//! inspection utility collects every plausible text source and the
//! deterministic classifiers run over that set.

use serde_json::Value;

use crate::domain::models::ErrorKind;

/// Phrases that indicate the context window was exhausted.
const CONTEXT_WINDOW_PHRASES: &[&str] = &[
    "prompt is too long",
    "input length exceeds",
    "input length and `max_tokens` exceed",
    "max context",
    "maximum context length",
    "context window",
    "tokens exceeds",
    "too many tokens",
];

/// Thinking-structure phrases that veto a context-window classification:
/// those errors mention token-ish words but need structural repair instead.
const THINKING_VETO_PATTERNS: &[&str] = &[
    r"thinking.*first block",
    r"thinking.*redacted_thinking",
    r"thinking is disabled.*cannot contain",
];

/// The sic spelling `preceeding` is what the upstream API emits.
const THINKING_ORDER_PHRASES: &[&str] = &[
    "first block",
    "must start with",
    "preceeding",
    "final block",
    "cannot be thinking",
];

const EDIT_ERROR_PHRASES: &[&str] = &[
    "oldstring not found",
    "old_string not found",
    "oldstring and newstring must be different",
    "old_string and new_string must be different",
    "oldstring found multiple times",
    "old_string found multiple times",
];

/// Collect every plausible text source from an opaque error value.
///
/// Looks at the value itself (when it is a string) and at the well-known
/// message-bearing keys, including the nested wrappers various SDKs add.
pub fn candidate_texts(error: &Value) -> Vec<String> {
    let mut texts = Vec::new();

    if let Some(s) = error.as_str() {
        texts.push(s.to_string());
    }

    let direct_keys = ["message", "body", "details", "reason", "description"];
    if let Some(map) = error.as_object() {
        for key in direct_keys {
            if let Some(s) = map.get(key).and_then(Value::as_str) {
                texts.push(s.to_string());
            }
        }
        for path in [
            &["data", "responseBody"][..],
            &["data", "message"],
            &["error", "message"],
            &["error", "error", "message"],
        ] {
            if let Some(s) = lookup_path(error, path).and_then(Value::as_str) {
                texts.push(s.to_string());
            }
        }
    }

    texts.retain(|t| !t.is_empty());
    texts
}

fn lookup_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Case-insensitive haystack of all candidate texts joined.
pub fn joined_haystack(error: &Value) -> String {
    candidate_texts(error).join("\n").to_lowercase()
}

fn matches_thinking_veto(haystack: &str) -> bool {
    THINKING_VETO_PATTERNS.iter().any(|pattern| {
        regex::Regex::new(pattern)
            .map(|re| re.is_match(haystack))
            .unwrap_or(false)
    })
}

/// Whether the haystack carries a context-window-limit phrase that is not
/// vetoed by a thinking-structure pattern.
pub fn is_context_window_error(haystack: &str) -> bool {
    CONTEXT_WINDOW_PHRASES.iter().any(|p| haystack.contains(p))
        && !matches_thinking_veto(haystack)
}

/// Classify an opaque error into the fixed taxonomy, in priority order.
///
/// `from_tool_output` gates the edit-error classification, which only ever
/// originates in tool outputs.
pub fn classify(error: &Value, from_tool_output: bool) -> Option<ErrorKind> {
    let haystack = joined_haystack(error);
    if haystack.is_empty() {
        return None;
    }
    classify_text(&haystack, from_tool_output)
}

pub fn classify_text(haystack: &str, from_tool_output: bool) -> Option<ErrorKind> {
    let haystack = haystack.to_lowercase();

    if is_context_window_error(&haystack) {
        return Some(ErrorKind::ContextWindowLimit);
    }

    if haystack.contains("tool_use") && haystack.contains("tool_result") {
        return Some(ErrorKind::ToolResultMissing);
    }

    if haystack.contains("thinking") {
        let order_phrase = THINKING_ORDER_PHRASES.iter().any(|p| haystack.contains(p));
        let expected_found = regex::Regex::new(r"expected.*found")
            .map(|re| re.is_match(&haystack))
            .unwrap_or(false);
        if order_phrase || expected_found {
            return Some(ErrorKind::ThinkingBlockOrder);
        }
    }

    if haystack.contains("thinking is disabled") && haystack.contains("cannot contain") {
        return Some(ErrorKind::ThinkingDisabledViolation);
    }

    if haystack.contains("empty")
        && (haystack.contains("content") || haystack.contains("message"))
    {
        return Some(ErrorKind::EmptyContent);
    }

    if from_tool_output && EDIT_ERROR_PHRASES.iter().any(|p| haystack.contains(p)) {
        return Some(ErrorKind::EditError);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candidate_texts_nested_shapes() {
        let error = json!({
            "message": "outer",
            "data": { "responseBody": "body text", "message": "data message" },
            "error": { "message": "inner", "error": { "message": "innermost" } }
        });
        let texts = candidate_texts(&error);
        for expected in ["outer", "body text", "data message", "inner", "innermost"] {
            assert!(texts.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_candidate_texts_plain_string() {
        let texts = candidate_texts(&json!("just a string"));
        assert_eq!(texts, vec!["just a string"]);
    }

    #[test]
    fn test_context_window_classification() {
        let error = json!("prompt is too long: 250000 tokens > 200000 maximum");
        assert_eq!(
            classify(&error, false),
            Some(ErrorKind::ContextWindowLimit)
        );
    }

    #[test]
    fn test_thinking_vetoes_context_window() {
        // Mentions tokens but is actually a structural violation.
        let error = json!(
            "context window note: messages.3: thinking must be the first block in the message"
        );
        assert_eq!(classify(&error, false), Some(ErrorKind::ThinkingBlockOrder));
    }

    #[test]
    fn test_thinking_block_order_variants() {
        for text in [
            "thinking must be the first block",
            "thinking blocks: expected `thinking`, found `text`",
            "a preceeding thinking block is required",
            "the final block cannot be thinking",
        ] {
            assert_eq!(
                classify(&json!(text), false),
                Some(ErrorKind::ThinkingBlockOrder),
                "{text}"
            );
        }
    }

    #[test]
    fn test_tool_result_missing_has_priority_over_thinking() {
        let error = json!("unexpected tool_use without tool_result after thinking: expected result, found none");
        assert_eq!(classify(&error, false), Some(ErrorKind::ToolResultMissing));
    }

    #[test]
    fn test_thinking_disabled_violation() {
        let error = json!("thinking is disabled but the request cannot contain thinking blocks");
        // `first block` style phrases are absent, so this falls through to
        // the disabled-violation classifier... unless `cannot be thinking`
        // matches. It does not; `cannot contain` is a different phrase.
        assert_eq!(
            classify(&error, false),
            Some(ErrorKind::ThinkingDisabledViolation)
        );
    }

    #[test]
    fn test_empty_content() {
        let error = json!({"message": "all messages must have non-empty content"});
        assert_eq!(classify(&error, false), Some(ErrorKind::EmptyContent));
    }

    #[test]
    fn test_edit_error_only_from_tool_output() {
        let error = json!("oldString not found in file");
        assert_eq!(classify(&error, true), Some(ErrorKind::EditError));
        assert_eq!(classify(&error, false), None);
    }

    #[test]
    fn test_unclassifiable() {
        assert_eq!(classify(&json!("some unrelated failure"), false), None);
        assert_eq!(classify(&json!({}), false), None);
        assert_eq!(classify(&Value::Null, false), None);
    }
}
