//! Recovery engine invariants: classification, token parsing, repair, and
//! the retry ledger.

use omc::domain::models::{ConversationPart, ErrorKind, PartType};
use omc::services::recovery::{
    classify, parse_token_limit_error, PartStore, RecoveryInput, RecoveryService, RepairEngine,
    RetryLedger,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn service() -> (TempDir, RecoveryService) {
    let dir = TempDir::new().unwrap();
    let engine = RepairEngine::new(PartStore::new(dir.path()));
    (dir, RecoveryService::new(engine, RetryLedger::with_defaults()))
}

fn text_part(id: &str, message_id: &str, text: &str) -> ConversationPart {
    let mut part = ConversationPart::new(id, message_id, "ses_1", PartType::Text);
    part.text = Some(text.to_string());
    part
}

/// Scenario: the canonical token-limit string parses into exact counts;
/// thinking-structure phrasing classifies as structural, never as a
/// context-window limit.
#[test]
fn context_window_parse_scenario() {
    let info = parse_token_limit_error(&json!("prompt is too long: 250000 tokens > 200000 max"))
        .expect("token counts parse");
    assert_eq!(info.current_tokens, 250_000);
    assert_eq!(info.max_tokens, 200_000);
    assert_eq!(info.error_type, "token_limit_exceeded_string");

    let classified = classify(&json!("thinking must be the first block"), false);
    assert_eq!(classified, Some(ErrorKind::ThinkingBlockOrder));
    assert!(parse_token_limit_error(&json!("thinking must be the first block")).is_none());
}

/// parse_token_limit_error is deterministic and nullable: token phrases
/// combined with thinking phrases are vetoed.
#[test]
fn token_parse_veto_invariant() {
    let vetoed = json!(
        "max context reached; messages.2: thinking must be the first block in the request"
    );
    assert!(parse_token_limit_error(&vetoed).is_none());
    assert!(parse_token_limit_error(&vetoed).is_none(), "deterministic");
}

/// Any corrupted assistant message gets a thinking-type first part after
/// repair, regardless of where the orphan sits.
#[test]
fn thinking_order_repair_invariant() {
    let dir = TempDir::new().unwrap();
    let store = PartStore::new(dir.path());
    store.write_part(&text_part("prt_10", "msg_a", "alpha")).unwrap();
    store.write_part(&text_part("prt_20", "msg_b", "beta")).unwrap();
    let mut thinking = ConversationPart::new("prt_01", "msg_c", "ses_1", PartType::Thinking);
    thinking.thinking = Some("already fine".to_string());
    store.write_part(&thinking).unwrap();

    let engine = RepairEngine::new(PartStore::new(dir.path()));
    let repaired = engine.repair_thinking_block_order("ses_1", None).unwrap();
    assert_eq!(repaired, 2);

    for message_id in ["msg_a", "msg_b", "msg_c"] {
        let parts = store.read_parts(message_id);
        assert!(
            parts[0].part_type.is_thinking(),
            "{message_id} must start with thinking after repair"
        );
    }
}

/// Recovery attempts per session per category are capped; the call after
/// the cap returns the exhausted message.
#[test]
fn retry_cap_invariant() {
    let (_dir, service) = service();
    let error = json!({"message": "all messages must have non-empty content"});

    let first = service.handle_recovery(&RecoveryInput {
        session_id: "s1".to_string(),
        error: error.clone(),
        ..Default::default()
    });
    assert!(first.attempted);

    let second = service.handle_recovery(&RecoveryInput {
        session_id: "s1".to_string(),
        error: error.clone(),
        ..Default::default()
    });
    assert!(second.attempted);

    let third = service.handle_recovery(&RecoveryInput {
        session_id: "s1".to_string(),
        error,
        ..Default::default()
    });
    assert!(third.attempted);
    assert!(!third.success);
    assert!(third.message.unwrap().contains("exhausted"));
}

/// The unified dispatch tries context-window recovery before structural
/// recovery and surfaces the first success.
#[test]
fn dispatch_priority_order() {
    let (_dir, service) = service();
    // This error text matches both a context phrase and the empty-content
    // classifier; context-window wins.
    let result = service.handle_recovery(&RecoveryInput {
        session_id: "s1".to_string(),
        error: json!("context window: 240000 tokens exceeds limit 200000; content empty"),
        ..Default::default()
    });
    assert!(result.attempted);
    assert_eq!(result.error_type.as_deref(), Some("context_window_limit"));
}

/// Tool-result repair leaves the conversation in a valid shape: every
/// tool_use has a matching tool_result.
#[test]
fn tool_result_repair_end_to_end() {
    let (dir, service) = service();
    let store = PartStore::new(dir.path());
    let mut tool_use = ConversationPart::new("prt_01", "msg_1", "ses_1", PartType::ToolUse);
    tool_use.tool_use_id = Some("toolu_1".to_string());
    store.write_part(&tool_use).unwrap();

    let result = service.handle_recovery(&RecoveryInput {
        session_id: "ses_1".to_string(),
        error: json!("request error: each tool_use must have a corresponding tool_result"),
        message_id: Some("msg_1".to_string()),
        ..Default::default()
    });
    assert!(result.success, "{result:?}");

    let parts = store.read_parts("msg_1");
    let uses: Vec<_> = parts.iter().filter(|p| p.part_type == PartType::ToolUse).collect();
    for tool_use in uses {
        let id = tool_use.tool_use_id.as_deref().unwrap();
        assert!(
            parts.iter().any(|p| p.part_type == PartType::ToolResult
                && p.tool_use_id.as_deref() == Some(id)),
            "tool_use {id} must be answered"
        );
    }
}

/// Edit errors never mutate the conversation; they only append a directive.
#[test]
fn edit_error_is_non_mutating() {
    let (dir, service) = service();
    let result = service.handle_recovery(&RecoveryInput {
        session_id: "s1".to_string(),
        error: Value::Null,
        tool_output: Some("oldString found multiple times in the file".to_string()),
        ..Default::default()
    });
    assert!(result.success);
    assert!(result.message.unwrap().contains("Re-read the file"));
    // Nothing was written to the part store.
    assert!(PartStore::new(dir.path()).list_message_ids().is_empty());
}
