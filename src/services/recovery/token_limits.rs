//! Token-count extraction from context-window rejections.
//!
//! The same failure arrives in several textual shapes depending on the
//! vendor path. Ordered regex shapes are tried against each candidate text
//! and against any JSON payload embedded inside a response body. Shapes
//! with explicit positions report `(current, max)` as written; shapes with
//! ambiguous positions treat the larger number as the maximum.

use regex::Regex;
use serde_json::Value;

use crate::domain::models::TokenLimitInfo;
use crate::services::recovery::classifier::{candidate_texts, is_context_window_error};

struct Shape {
    pattern: &'static str,
    error_type: &'static str,
    /// Whether group 1 is definitely the current consumption and group 2
    /// the maximum. Unordered shapes assign larger = max.
    ordered: bool,
}

const SHAPES: &[Shape] = &[
    Shape {
        pattern: r"prompt is too long:?\s*(\d+)\s*tokens?\s*>\s*(\d+)\s*max",
        error_type: "token_limit_exceeded_string",
        ordered: true,
    },
    Shape {
        pattern: r"(\d+)\s*tokens?\s*>\s*(\d+)\s*max",
        error_type: "token_limit_exceeded_string",
        ordered: true,
    },
    Shape {
        pattern: r"input length\D*(\d+)\D+exceed\D*(\d+)",
        error_type: "input_length_exceeded",
        ordered: true,
    },
    Shape {
        pattern: r"(\d+)\s*tokens?\s*exceeds?\D*(\d+)",
        error_type: "tokens_exceed_limit",
        ordered: true,
    },
    Shape {
        pattern: r"(?:context|window|limit|maximum)\D{0,40}(\d{4,})\D{1,60}(\d{4,})",
        error_type: "token_limit_generic",
        ordered: false,
    },
];

/// Parse token counts out of a context-window rejection. Returns `None`
/// when the error is not a (non-vetoed) context-window failure or when no
/// shape matches. Deterministic for any given input.
pub fn parse_token_limit_error(error: &Value) -> Option<TokenLimitInfo> {
    let texts = candidate_texts(error);
    let haystack = texts.join("\n").to_lowercase();
    if !is_context_window_error(&haystack) {
        return None;
    }

    let mut sources: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    // Response bodies often wrap the real message in a JSON payload.
    for text in &texts {
        for embedded in embedded_json_texts(text) {
            sources.push(embedded.to_lowercase());
        }
    }

    for shape in SHAPES {
        let Ok(re) = Regex::new(shape.pattern) else {
            continue;
        };
        for source in &sources {
            if let Some(caps) = re.captures(source) {
                let first: u64 = caps.get(1)?.as_str().parse().ok()?;
                let second: u64 = caps.get(2)?.as_str().parse().ok()?;
                let (current, max) = if shape.ordered {
                    (first, second)
                } else {
                    (first.min(second), first.max(second))
                };
                return Some(TokenLimitInfo {
                    current_tokens: current,
                    max_tokens: max,
                    error_type: shape.error_type.to_string(),
                });
            }
        }
    }
    None
}

/// Extract candidate texts from a JSON object embedded in a larger string,
/// e.g. an HTTP response body logged inside an error message.
fn embedded_json_texts(text: &str) -> Vec<String> {
    let Some(start) = text.find('{') else {
        return Vec::new();
    };
    let Some(end) = text.rfind('}') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value) => candidate_texts(&value),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_string_shape() {
        let info =
            parse_token_limit_error(&json!("prompt is too long: 250000 tokens > 200000 max"))
                .unwrap();
        assert_eq!(info.current_tokens, 250_000);
        assert_eq!(info.max_tokens, 200_000);
        assert_eq!(info.error_type, "token_limit_exceeded_string");
    }

    #[test]
    fn test_thinking_phrase_vetoes_parse() {
        let result =
            parse_token_limit_error(&json!("thinking must be the first block; max context hit"));
        assert!(result.is_none());
    }

    #[test]
    fn test_input_length_shape() {
        let info = parse_token_limit_error(&json!(
            "input length exceeds limit: input length of 210000 exceeds maximum of 200000"
        ))
        .unwrap();
        assert_eq!(info.current_tokens, 210_000);
        assert_eq!(info.max_tokens, 200_000);
    }

    #[test]
    fn test_embedded_json_body() {
        let error = json!({
            "data": {
                "responseBody": "HTTP 400: {\"error\":{\"message\":\"prompt is too long: 205000 tokens > 200000 maximum\"}}"
            }
        });
        let info = parse_token_limit_error(&error).unwrap();
        assert_eq!(info.current_tokens, 205_000);
        assert_eq!(info.max_tokens, 200_000);
    }

    #[test]
    fn test_generic_shape_orders_by_magnitude() {
        let info = parse_token_limit_error(&json!(
            "request rejected: maximum context window is 200000 but conversation needs 231500"
        ))
        .unwrap();
        assert_eq!(info.max_tokens, 231_500_u64.max(200_000));
        assert_eq!(info.current_tokens, 200_000_u64.min(231_500));
        assert_eq!(info.error_type, "token_limit_generic");
    }

    #[test]
    fn test_non_token_error_is_none() {
        assert!(parse_token_limit_error(&json!("rate limited")).is_none());
        assert!(parse_token_limit_error(&json!("context window pressure")).is_none());
    }

    #[test]
    fn test_deterministic() {
        let error = json!("prompt is too long: 250000 tokens > 200000 max");
        let a = parse_token_limit_error(&error);
        let b = parse_token_limit_error(&error);
        assert_eq!(a, b);
    }
}
