//! In-session context collection and per-session state location.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::DomainResult;
use crate::infrastructure::worktree::{atomic_write_json, safe_read_json, Worktree};

/// Collects named context sections during a session and renders them in
/// registration order for injection into the host.
#[derive(Debug, Default)]
pub struct ContextCollector {
    sections: Vec<(String, String)>,
}

impl ContextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a section. Re-registering a name replaces its content but
    /// keeps its original position.
    pub fn register(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        let content = content.into();
        if let Some(existing) = self.sections.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = content;
        } else {
            self.sections.push((name, content));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Render all sections in registration order. Empty sections are
    /// skipped.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, content) in &self.sections {
            if content.trim().is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {name}\n\n{content}\n"));
        }
        out
    }
}

/// Locates and reads/writes per-session mode state files under
/// `.omc/state/sessions/<session-id>/`.
pub struct SessionStateLocator {
    worktree: Worktree,
}

impl SessionStateLocator {
    pub fn new(worktree: Worktree) -> Self {
        Self { worktree }
    }

    /// Read a mode's session state. Absent or unreadable files yield
    /// `None`; the session id is validated before touching the filesystem.
    pub fn read<T: DeserializeOwned>(
        &self,
        session_id: &str,
        mode: &str,
    ) -> DomainResult<Option<T>> {
        let path = self.worktree.session_state_file(session_id, mode)?;
        Ok(safe_read_json(&path))
    }

    pub fn write<T: Serialize>(
        &self,
        session_id: &str,
        mode: &str,
        state: &T,
    ) -> DomainResult<()> {
        let path = self.worktree.session_state_file(session_id, mode)?;
        atomic_write_json(&path, state)
    }

    pub fn clear(&self, session_id: &str, mode: &str) -> DomainResult<()> {
        let path = self.worktree.session_state_file(session_id, mode)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
