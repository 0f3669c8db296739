//! Append-only debug logs under the temp directory.
//!
//! Production stays silent; each log activates only when its gating
//! environment variable is truthy. Write failures are swallowed; a debug
//! log must never take down a hook.

use std::io::Write;
use std::path::PathBuf;

use super::env_flag;

/// One env-gated debug log file.
#[derive(Debug, Clone)]
pub struct DebugLog {
    path: PathBuf,
    gate: &'static str,
}

impl DebugLog {
    pub fn new(file_name: &str, gate: &'static str) -> Self {
        Self {
            path: std::env::temp_dir().join(file_name),
            gate,
        }
    }

    /// Debug log for context-window recovery.
    pub fn context_recovery() -> Self {
        Self::new("context-window-recovery-debug.log", "OMC_DEBUG")
    }

    /// Debug log for session-structure recovery.
    pub fn session_recovery() -> Self {
        Self::new("session-recovery-debug.log", "OMC_DEBUG")
    }

    /// Debug log for the preemptive compaction monitor.
    pub fn compaction() -> Self {
        Self::new("preemptive-compaction-debug.log", "PREEMPTIVE_COMPACTION_DEBUG")
    }

    pub fn enabled(&self) -> bool {
        env_flag(self.gate)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one timestamped line when the gate is open.
    pub fn line(&self, message: &str) {
        if !self.enabled() {
            return;
        }
        let stamp = chrono::Utc::now().to_rfc3339();
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "[{stamp}] {message}"));
        if result.is_err() {
            tracing::debug!(path = %self.path.display(), "debug log write failed");
        }
    }
}
