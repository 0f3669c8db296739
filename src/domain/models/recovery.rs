//! Recovery engine types: error classification, token-limit extraction,
//! and on-disk conversation parts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed taxonomy of recoverable API failures, in classification
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContextWindowLimit,
    ToolResultMissing,
    ThinkingBlockOrder,
    ThinkingDisabledViolation,
    EmptyContent,
    EditError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ContextWindowLimit => "context_window_limit",
            ErrorKind::ToolResultMissing => "tool_result_missing",
            ErrorKind::ThinkingBlockOrder => "thinking_block_order",
            ErrorKind::ThinkingDisabledViolation => "thinking_disabled_violation",
            ErrorKind::EmptyContent => "empty_content",
            ErrorKind::EditError => "edit_error",
        }
    }
}

/// Numeric token counts extracted from a context-window rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimitInfo {
    pub current_tokens: u64,
    pub max_tokens: u64,
    /// Which parser shape matched, e.g. `token_limit_exceeded_string`.
    pub error_type: String,
}

/// Part types of an on-disk conversation message.
///
/// Wire names mix snake_case and kebab-case; they are preserved exactly as
/// the host writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "thinking")]
    Thinking,
    #[serde(rename = "redacted_thinking")]
    RedactedThinking,
    #[serde(rename = "tool_use")]
    ToolUse,
    #[serde(rename = "tool_result")]
    ToolResult,
    #[serde(rename = "tool")]
    Tool,
    #[serde(rename = "step-start")]
    StepStart,
    #[serde(rename = "step-finish")]
    StepFinish,
    #[serde(rename = "file")]
    File,
}

impl PartType {
    pub fn is_thinking(&self) -> bool {
        matches!(self, PartType::Thinking | PartType::RedactedThinking)
    }
}

/// One persisted conversation part. Stored as a single JSON file per part
/// under the host's message storage root; mutated only via atomic writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPart {
    pub id: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "type")]
    pub part_type: PartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(rename = "toolUseId", skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Type-specific payload preserved verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}

impl ConversationPart {
    pub fn new(
        id: impl Into<String>,
        message_id: impl Into<String>,
        session_id: impl Into<String>,
        part_type: PartType,
    ) -> Self {
        Self {
            id: id.into(),
            message_id: message_id.into(),
            session_id: session_id.into(),
            part_type,
            text: None,
            thinking: None,
            tool_use_id: None,
            tool_name: None,
            content: Value::Null,
        }
    }
}

/// Result of one recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub attempted: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl RecoveryResult {
    pub fn not_attempted() -> Self {
        Self {
            attempted: false,
            success: false,
            message: None,
            error_type: None,
        }
    }

    pub fn succeeded(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            attempted: true,
            success: true,
            message: Some(message.into()),
            error_type: Some(kind.as_str().to_string()),
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            attempted: true,
            success: false,
            message: Some(message.into()),
            error_type: Some(kind.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_type_thinking_family() {
        assert!(PartType::Thinking.is_thinking());
        assert!(PartType::RedactedThinking.is_thinking());
        assert!(!PartType::Text.is_thinking());
        assert!(!PartType::ToolResult.is_thinking());
    }

    #[test]
    fn test_part_type_wire_names() {
        let json = serde_json::to_string(&PartType::RedactedThinking).unwrap();
        assert_eq!(json, "\"redacted_thinking\"");
        let json = serde_json::to_string(&PartType::ToolUse).unwrap();
        assert_eq!(json, "\"tool_use\"");
        let json = serde_json::to_string(&PartType::StepStart).unwrap();
        assert_eq!(json, "\"step-start\"");
    }

    #[test]
    fn test_part_round_trip() {
        let mut part = ConversationPart::new("prt_1", "msg_1", "ses_1", PartType::Text);
        part.text = Some("hello".to_string());
        let json = serde_json::to_string(&part).unwrap();
        let back: ConversationPart = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "prt_1");
        assert_eq!(back.part_type, PartType::Text);
        assert_eq!(back.text.as_deref(), Some("hello"));
    }
}
