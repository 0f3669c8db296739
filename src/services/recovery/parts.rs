//! On-disk conversation part storage.
//!
//! The host persists one directory per message under a storage root, with
//! one JSON file per part. The recovery engine reads, inserts, strips, and
//! rewrites these files; every mutation goes through the atomic writer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConversationPart, PartType};
use crate::infrastructure::worktree::{atomic_write_json, safe_read_json};

/// Fixed id for synthetic thinking parts: sorts before any id the host
/// generates, so a prepended thinking block lands first after the usual
/// sort-by-id.
pub const SYNTHETIC_THINKING_PART_ID: &str = "prt_00000000000000000000000000";

/// Placeholder body for a synthetic thinking part when no prior thinking
/// content exists to carry forward.
pub const THINKING_PLACEHOLDER: &str = "[Continuing from previous reasoning]";

/// Replacement body for empty text parts.
pub const TEXT_PLACEHOLDER: &str = "[Content unavailable]";

/// Per-message metadata written by the host next to the parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMeta {
    pub id: String,
    pub role: String,
}

pub struct PartStore {
    root: PathBuf,
}

impl PartStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Message ids in id order. Missing storage root reads as empty.
    pub fn list_message_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        ids.sort();
        ids
    }

    pub fn message_meta(&self, message_id: &str) -> Option<MessageMeta> {
        safe_read_json(&self.root.join(message_id).join("message.json"))
    }

    /// Whether the message is an assistant message. Messages without
    /// metadata are treated as assistant messages so a missing meta file
    /// never blocks a repair.
    pub fn is_assistant(&self, message_id: &str) -> bool {
        self.message_meta(message_id)
            .map_or(true, |meta| meta.role == "assistant")
    }

    /// Parts of one message, sorted by id. Unreadable part files are
    /// skipped.
    pub fn read_parts(&self, message_id: &str) -> Vec<ConversationPart> {
        let dir = self.root.join(message_id);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut parts: Vec<ConversationPart> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "json")
                    && p.file_name().is_some_and(|n| n != "message.json")
            })
            .filter_map(|p| safe_read_json(&p))
            .collect();
        parts.sort_by(|a, b| a.id.cmp(&b.id));
        parts
    }

    pub fn write_part(&self, part: &ConversationPart) -> DomainResult<()> {
        let path = self
            .root
            .join(&part.message_id)
            .join(format!("{}.json", part.id));
        atomic_write_json(&path, part)
    }

    pub fn delete_part(&self, message_id: &str, part_id: &str) -> DomainResult<()> {
        let path = self.root.join(message_id).join(format!("{part_id}.json"));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Build a synthetic thinking part that will sort first in the message.
    pub fn synthetic_thinking(
        &self,
        message_id: &str,
        session_id: &str,
        content: &str,
    ) -> ConversationPart {
        let mut part = ConversationPart::new(
            SYNTHETIC_THINKING_PART_ID,
            message_id,
            session_id,
            PartType::Thinking,
        );
        part.thinking = Some(content.to_string());
        part
    }
}
