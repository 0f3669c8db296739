//! Mutual exclusion between operational modes sharing one worktree.
//!
//! Each active mode owns a marker file under `.omc/state/`. Entering a mode
//! fails with a caller-visible message while another exclusive mode's
//! marker exists; exiting removes the marker. Marker writes go through the
//! atomic primitive so readers never see a torn marker.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::worktree::{atomic_write_json, safe_read_json, Worktree};

/// Modes that exclude each other within one worktree.
pub const EXCLUSIVE_MODES: &[&str] = &["swarm", "autopilot", "ralph", "persistent"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeMarker {
    pub mode: String,
    pub session_id: String,
    pub pid: u32,
    pub started_at: chrono::DateTime<Utc>,
}

#[derive(Debug)]
pub struct ModeRegistry {
    worktree: Worktree,
}

impl ModeRegistry {
    pub fn new(worktree: Worktree) -> Self {
        Self { worktree }
    }

    fn marker_path(&self, mode: &str) -> DomainResult<PathBuf> {
        self.worktree
            .resolve_omc_path(format!("state/{mode}-mode.json"))
    }

    /// Claim `mode` for `session_id`. Fails with `ModeInUse` when the same
    /// or any conflicting exclusive mode is already held.
    pub fn enter(&self, mode: &str, session_id: &str) -> DomainResult<()> {
        if let Some(holder) = self.active_conflict(mode)? {
            return Err(DomainError::ModeInUse {
                mode: holder.mode,
                holder: holder.session_id,
            });
        }

        let marker = ModeMarker {
            mode: mode.to_string(),
            session_id: session_id.to_string(),
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let path = self.marker_path(mode)?;
        atomic_write_json(&path, &marker)?;
        tracing::info!(mode, session_id, "entered mode");
        Ok(())
    }

    /// Release `mode`. Removing an absent marker is a no-op.
    pub fn exit(&self, mode: &str) -> DomainResult<()> {
        let path = self.marker_path(mode)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(mode, "exited mode");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The marker currently held for `mode`, if any.
    pub fn current(&self, mode: &str) -> DomainResult<Option<ModeMarker>> {
        let path = self.marker_path(mode)?;
        Ok(safe_read_json(&path))
    }

    /// The first exclusive-mode marker that conflicts with entering `mode`.
    fn active_conflict(&self, mode: &str) -> DomainResult<Option<ModeMarker>> {
        if let Some(marker) = self.current(mode)? {
            return Ok(Some(marker));
        }
        if EXCLUSIVE_MODES.contains(&mode) {
            for other in EXCLUSIVE_MODES {
                if *other == mode {
                    continue;
                }
                if let Some(marker) = self.current(other)? {
                    return Ok(Some(marker));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, ModeRegistry) {
        let dir = TempDir::new().unwrap();
        let tree = Worktree::at_root(dir.path());
        tree.ensure_omc_dir("state").unwrap();
        (dir, ModeRegistry::new(tree))
    }

    #[test]
    fn test_enter_exit_round_trip() {
        let (_dir, registry) = registry();
        registry.enter("swarm", "pid-1-1").unwrap();
        let marker = registry.current("swarm").unwrap().unwrap();
        assert_eq!(marker.session_id, "pid-1-1");
        registry.exit("swarm").unwrap();
        assert!(registry.current("swarm").unwrap().is_none());
    }

    #[test]
    fn test_same_mode_conflicts() {
        let (_dir, registry) = registry();
        registry.enter("swarm", "pid-1-1").unwrap();
        let err = registry.enter("swarm", "pid-2-2").unwrap_err();
        assert!(matches!(err, DomainError::ModeInUse { .. }));
    }

    #[test]
    fn test_exclusive_modes_conflict_with_each_other() {
        let (_dir, registry) = registry();
        registry.enter("autopilot", "pid-1-1").unwrap();
        let err = registry.enter("swarm", "pid-2-2").unwrap_err();
        match err {
            DomainError::ModeInUse { mode, holder } => {
                assert_eq!(mode, "autopilot");
                assert_eq!(holder, "pid-1-1");
            }
            other => panic!("expected ModeInUse, got {other:?}"),
        }
    }

    #[test]
    fn test_exit_is_idempotent() {
        let (_dir, registry) = registry();
        registry.exit("swarm").unwrap();
        registry.exit("swarm").unwrap();
    }
}
