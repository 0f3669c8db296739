//! Repair procedures: mutate persisted conversation parts until the
//! conversation is a shape the API will accept again.

use serde_json::json;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConversationPart, PartType};
use crate::infrastructure::logging::DebugLog;
use crate::services::recovery::parts::{
    PartStore, TEXT_PLACEHOLDER, THINKING_PLACEHOLDER,
};

/// Offsets of the fuzzy index walk used when an error names a message by
/// index: the reported index first, then near misses.
const FUZZY_OFFSETS: &[i64] = &[0, -1, 1, -2, 2, -3, -4, -5];

pub struct RepairEngine {
    store: PartStore,
    session_log: DebugLog,
}

impl RepairEngine {
    pub fn new(store: PartStore) -> Self {
        Self {
            store,
            session_log: DebugLog::session_recovery(),
        }
    }

    pub fn store(&self) -> &PartStore {
        &self.store
    }

    /// Inject synthetic `tool_result` parts for every `tool_use` in the
    /// failed message that lacks one. Tool-use ids come from the live
    /// structure when the caller has it; otherwise from stored parts.
    /// Returns the number of injected results.
    pub fn repair_tool_result_missing(
        &self,
        session_id: &str,
        message_id: &str,
        live_tool_use_ids: Option<&[String]>,
    ) -> DomainResult<usize> {
        let parts = self.store.read_parts(message_id);

        let tool_use_ids: Vec<String> = match live_tool_use_ids {
            Some(ids) => ids.to_vec(),
            None => parts
                .iter()
                .filter(|p| p.part_type == PartType::ToolUse)
                .filter_map(|p| p.tool_use_id.clone().or_else(|| Some(p.id.clone())))
                .collect(),
        };

        let mut injected = 0;
        for (index, tool_use_id) in tool_use_ids.iter().enumerate() {
            let satisfied = parts.iter().any(|p| {
                p.part_type == PartType::ToolResult
                    && p.tool_use_id.as_deref() == Some(tool_use_id.as_str())
            });
            if satisfied {
                continue;
            }

            let mut result = ConversationPart::new(
                format!("prt_zzzz-recovered-{index:04}"),
                message_id,
                session_id,
                PartType::ToolResult,
            );
            result.tool_use_id = Some(tool_use_id.clone());
            result.content = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": "Tool execution was cancelled.",
                "is_error": false
            });
            self.store.write_part(&result)?;
            injected += 1;
        }

        self.session_log.line(&format!(
            "tool_result_missing: injected {injected} synthetic results into {message_id}"
        ));
        Ok(injected)
    }

    /// Restore thinking-first ordering. With a message index, the fuzzy
    /// walk targets that message; without one, every assistant message is
    /// scanned for orphan thinking. Returns the number of repaired
    /// messages.
    pub fn repair_thinking_block_order(
        &self,
        session_id: &str,
        error_index: Option<usize>,
    ) -> DomainResult<usize> {
        let message_ids = self.store.list_message_ids();

        if let Some(index) = error_index {
            for offset in FUZZY_OFFSETS {
                let target = index as i64 + offset;
                if target < 0 || target as usize >= message_ids.len() {
                    continue;
                }
                let message_id = &message_ids[target as usize];
                if !self.store.is_assistant(message_id) {
                    continue;
                }
                if self.repair_orphan_thinking(session_id, message_id, &message_ids)? {
                    self.session_log.line(&format!(
                        "thinking_block_order: repaired {message_id} (index {index}, offset {offset})"
                    ));
                    return Ok(1);
                }
            }
            return Ok(0);
        }

        let mut repaired = 0;
        for message_id in &message_ids {
            if !self.store.is_assistant(message_id) {
                continue;
            }
            if self.repair_orphan_thinking(session_id, message_id, &message_ids)? {
                repaired += 1;
            }
        }
        self.session_log.line(&format!(
            "thinking_block_order: scan repaired {repaired} messages"
        ));
        Ok(repaired)
    }

    /// Prepend a synthetic thinking part when the message's sorted parts do
    /// not begin with a thinking-type part. Carries forward the most recent
    /// prior non-empty thinking content when available.
    fn repair_orphan_thinking(
        &self,
        session_id: &str,
        message_id: &str,
        all_message_ids: &[String],
    ) -> DomainResult<bool> {
        let parts = self.store.read_parts(message_id);
        if parts.is_empty() {
            return Ok(false);
        }
        if parts[0].part_type.is_thinking() {
            return Ok(false);
        }

        let content = self
            .prior_thinking_content(message_id, all_message_ids)
            .unwrap_or_else(|| THINKING_PLACEHOLDER.to_string());
        let synthetic = self.store.synthetic_thinking(message_id, session_id, &content);
        self.store.write_part(&synthetic)?;
        Ok(true)
    }

    /// Most recent non-empty thinking content from messages before
    /// `message_id`.
    fn prior_thinking_content(
        &self,
        message_id: &str,
        all_message_ids: &[String],
    ) -> Option<String> {
        let position = all_message_ids.iter().position(|id| id == message_id)?;
        for earlier in all_message_ids[..position].iter().rev() {
            let parts = self.store.read_parts(earlier);
            let thinking = parts.iter().rev().find_map(|p| {
                if p.part_type.is_thinking() {
                    p.thinking.as_deref().filter(|t| !t.trim().is_empty())
                } else {
                    None
                }
            });
            if let Some(content) = thinking {
                return Some(content.to_string());
            }
        }
        None
    }

    /// Delete every thinking-type part from assistant messages. Returns the
    /// number of deleted parts.
    pub fn repair_thinking_disabled(&self) -> DomainResult<usize> {
        let mut deleted = 0;
        for message_id in self.store.list_message_ids() {
            if !self.store.is_assistant(&message_id) {
                continue;
            }
            for part in self.store.read_parts(&message_id) {
                if part.part_type.is_thinking() {
                    self.store.delete_part(&message_id, &part.id)?;
                    deleted += 1;
                }
            }
        }
        self.session_log.line(&format!(
            "thinking_disabled_violation: stripped {deleted} thinking parts"
        ));
        Ok(deleted)
    }

    /// Repair empty content. Strategies run in priority order and the
    /// first that mutates anything wins:
    /// (a) fill empty text parts, (b) add text to thinking-only messages,
    /// (c) the fuzzy-walked index target, (d) the failed message id,
    /// (e) every message with no parts at all.
    pub fn repair_empty_content(
        &self,
        session_id: &str,
        error_index: Option<usize>,
        failed_message_id: Option<&str>,
    ) -> DomainResult<usize> {
        let message_ids = self.store.list_message_ids();

        // (a) Empty text parts anywhere.
        let mut mutated = 0;
        for message_id in &message_ids {
            for mut part in self.store.read_parts(message_id) {
                if part.part_type == PartType::Text
                    && part.text.as_deref().is_none_or(|t| t.trim().is_empty())
                {
                    part.text = Some(TEXT_PLACEHOLDER.to_string());
                    self.store.write_part(&part)?;
                    mutated += 1;
                }
            }
        }
        if mutated > 0 {
            self.session_log
                .line(&format!("empty_content: filled {mutated} empty text parts"));
            return Ok(mutated);
        }

        // (b) Messages that contain only thinking.
        for message_id in &message_ids {
            let parts = self.store.read_parts(message_id);
            if !parts.is_empty() && parts.iter().all(|p| p.part_type.is_thinking()) {
                self.inject_text(session_id, message_id)?;
                mutated += 1;
            }
        }
        if mutated > 0 {
            self.session_log.line(&format!(
                "empty_content: injected text into {mutated} thinking-only messages"
            ));
            return Ok(mutated);
        }

        // (c) The index named by the error, with fuzzy tolerance.
        if let Some(index) = error_index {
            for offset in FUZZY_OFFSETS {
                let target = index as i64 + offset;
                if target < 0 || target as usize >= message_ids.len() {
                    continue;
                }
                let message_id = &message_ids[target as usize];
                if self.store.read_parts(message_id).is_empty() {
                    self.inject_text(session_id, message_id)?;
                    self.session_log
                        .line(&format!("empty_content: filled indexed message {message_id}"));
                    return Ok(1);
                }
            }
        }

        // (d) The failed message id.
        if let Some(message_id) = failed_message_id {
            if message_ids.iter().any(|id| id == message_id)
                && self.store.read_parts(message_id).is_empty()
            {
                self.inject_text(session_id, message_id)?;
                self.session_log
                    .line(&format!("empty_content: filled failed message {message_id}"));
                return Ok(1);
            }
        }

        // (e) Every empty message.
        for message_id in &message_ids {
            if self.store.read_parts(message_id).is_empty() {
                self.inject_text(session_id, message_id)?;
                mutated += 1;
            }
        }
        self.session_log
            .line(&format!("empty_content: fallback filled {mutated} messages"));
        Ok(mutated)
    }

    fn inject_text(&self, session_id: &str, message_id: &str) -> DomainResult<()> {
        let mut part = ConversationPart::new(
            "prt_zzzz-recovered-text",
            message_id,
            session_id,
            PartType::Text,
        );
        part.text = Some(TEXT_PLACEHOLDER.to_string());
        self.store.write_part(&part)
    }
}

/// Non-mutating edit-tool recovery: append a directive telling the model to
/// re-read the file before retrying the edit.
pub fn edit_retry_directive(tool_output: &str) -> String {
    format!(
        "{tool_output}\n\n[edit recovery] The edit failed because the target text did not \
         match the file. Re-read the file to get its current contents, then retry the edit \
         with an exact oldString taken from the fresh read."
    )
}
