//! Hook payloads exchanged with the host assistant.
//!
//! Each hook invocation is one JSON object on stdin and one JSON object on
//! stdout. Inputs may arrive in snake_case or camelCase; normalization to
//! the canonical camelCase set happens before validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of hook types the dispatcher routes.
///
/// Unknown type strings map to `Unknown` and always produce
/// `{continue: true}` without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    KeywordDetector,
    StopContinuation,
    Ralph,
    PersistentMode,
    SessionStart,
    SessionEnd,
    PreToolUse,
    PostToolUse,
    Autopilot,
    SubagentStart,
    SubagentStop,
    PreCompact,
    SetupInit,
    SetupMaintenance,
    PermissionRequest,
    Unknown,
}

impl HookType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "keyword-detector" => HookType::KeywordDetector,
            "stop-continuation" => HookType::StopContinuation,
            "ralph" => HookType::Ralph,
            "persistent-mode" => HookType::PersistentMode,
            "session-start" => HookType::SessionStart,
            "session-end" => HookType::SessionEnd,
            "pre-tool-use" => HookType::PreToolUse,
            "post-tool-use" => HookType::PostToolUse,
            "autopilot" => HookType::Autopilot,
            "subagent-start" => HookType::SubagentStart,
            "subagent-stop" => HookType::SubagentStop,
            "pre-compact" => HookType::PreCompact,
            "setup-init" => HookType::SetupInit,
            "setup-maintenance" => HookType::SetupMaintenance,
            "permission-request" => HookType::PermissionRequest,
            _ => HookType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HookType::KeywordDetector => "keyword-detector",
            HookType::StopContinuation => "stop-continuation",
            HookType::Ralph => "ralph",
            HookType::PersistentMode => "persistent-mode",
            HookType::SessionStart => "session-start",
            HookType::SessionEnd => "session-end",
            HookType::PreToolUse => "pre-tool-use",
            HookType::PostToolUse => "post-tool-use",
            HookType::Autopilot => "autopilot",
            HookType::SubagentStart => "subagent-start",
            HookType::SubagentStop => "subagent-stop",
            HookType::PreCompact => "pre-compact",
            HookType::SetupInit => "setup-init",
            HookType::SetupMaintenance => "setup-maintenance",
            HookType::PermissionRequest => "permission-request",
            HookType::Unknown => "unknown",
        }
    }

    /// Keys that must be present (after normalization) for the handler to run.
    /// Missing keys log a diagnostic and produce `{continue: true}`.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            HookType::SessionEnd
            | HookType::SubagentStart
            | HookType::SubagentStop
            | HookType::PreCompact
            | HookType::SetupInit
            | HookType::SetupMaintenance => &["sessionId", "directory"],
            HookType::PermissionRequest => &["sessionId", "directory", "toolName"],
            _ => &[],
        }
    }
}

/// Normalized hook input. Raw payload is retained for hook-specific keys.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    pub session_id: Option<String>,
    pub directory: Option<String>,
    pub prompt: Option<String>,
    pub tool_name: Option<String>,
    pub tool_input: Option<Value>,
    pub tool_output: Option<String>,
    pub raw: Value,
}

impl HookInput {
    /// Normalize a raw JSON payload: snake_case aliases are folded into the
    /// canonical camelCase keys. Null and non-object payloads normalize to
    /// an empty input.
    pub fn normalize(raw: Value) -> Self {
        let Some(map) = raw.as_object() else {
            return Self::default();
        };

        let get_str = |camel: &str, snake: &str| -> Option<String> {
            map.get(camel)
                .or_else(|| map.get(snake))
                .and_then(Value::as_str)
                .map(String::from)
        };

        let tool_input = map
            .get("toolInput")
            .or_else(|| map.get("tool_input"))
            .filter(|v| !v.is_null())
            .cloned();

        // `tool_response` is the snake_case alias the host uses for tool output.
        let tool_output = map
            .get("toolOutput")
            .or_else(|| map.get("tool_response"))
            .and_then(Value::as_str)
            .map(String::from);

        Self {
            session_id: get_str("sessionId", "session_id"),
            directory: get_str("directory", "cwd"),
            prompt: get_str("prompt", "prompt"),
            tool_name: get_str("toolName", "tool_name"),
            tool_input,
            tool_output,
            raw,
        }
    }

    /// Which required keys are missing from this input.
    pub fn missing_keys(&self, required: &[&str]) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for key in required {
            let present = match *key {
                "sessionId" => self.session_id.is_some(),
                "directory" => self.directory.is_some(),
                "toolName" => self.tool_name.is_some(),
                "prompt" => self.prompt.is_some(),
                _ => self.raw.get(*key).is_some(),
            };
            if !present {
                // Required key names are drawn from a static set.
                match *key {
                    "sessionId" => missing.push("sessionId"),
                    "directory" => missing.push("directory"),
                    "toolName" => missing.push("toolName"),
                    "prompt" => missing.push("prompt"),
                    _ => {}
                }
            }
        }
        missing
    }
}

/// The fixed response shape every hook emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    #[serde(rename = "continue")]
    pub continue_: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<bool>,
    #[serde(rename = "suppressOutput", skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
}

impl HookResponse {
    /// The silent pass-through response. Hooks must never crash the host;
    /// every failure path degrades to this.
    pub fn proceed() -> Self {
        Self {
            continue_: true,
            message: None,
            reason: None,
            stop: None,
            suppress_output: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::proceed()
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            continue_: false,
            reason: Some(reason.into()),
            ..Self::proceed()
        }
    }
}

impl Default for HookResponse {
    fn default() -> Self {
        Self::proceed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hook_type_round_trip() {
        let names = [
            "keyword-detector",
            "stop-continuation",
            "ralph",
            "persistent-mode",
            "session-start",
            "session-end",
            "pre-tool-use",
            "post-tool-use",
            "autopilot",
            "subagent-start",
            "subagent-stop",
            "pre-compact",
            "setup-init",
            "setup-maintenance",
            "permission-request",
        ];
        for name in names {
            let hook = HookType::from_name(name);
            assert_ne!(hook, HookType::Unknown, "{name} should be recognized");
            assert_eq!(hook.name(), name);
        }
        assert_eq!(HookType::from_name("made-up"), HookType::Unknown);
    }

    #[test]
    fn test_normalize_snake_case() {
        let input = HookInput::normalize(json!({
            "session_id": "s1",
            "tool_name": "Read",
            "tool_input": {"file_path": "/tmp/x"},
            "tool_response": "contents",
            "cwd": "/repo"
        }));
        assert_eq!(input.session_id.as_deref(), Some("s1"));
        assert_eq!(input.tool_name.as_deref(), Some("Read"));
        assert_eq!(input.directory.as_deref(), Some("/repo"));
        assert_eq!(input.tool_output.as_deref(), Some("contents"));
        assert!(input.tool_input.is_some());
    }

    #[test]
    fn test_normalize_camel_case_wins() {
        let input = HookInput::normalize(json!({
            "sessionId": "camel",
            "session_id": "snake"
        }));
        assert_eq!(input.session_id.as_deref(), Some("camel"));
    }

    #[test]
    fn test_normalize_null_payload() {
        let input = HookInput::normalize(Value::Null);
        assert!(input.session_id.is_none());
        assert!(input.raw.is_null());
    }

    #[test]
    fn test_missing_keys() {
        let input = HookInput::normalize(json!({"sessionId": "s"}));
        let missing = input.missing_keys(HookType::PermissionRequest.required_keys());
        assert_eq!(missing, vec!["directory", "toolName"]);
    }

    #[test]
    fn test_response_serialization_shape() {
        let json = serde_json::to_value(HookResponse::proceed()).unwrap();
        assert_eq!(json, json!({"continue": true}));

        let json = serde_json::to_value(HookResponse::with_message("hi")).unwrap();
        assert_eq!(json, json!({"continue": true, "message": "hi"}));
    }
}
