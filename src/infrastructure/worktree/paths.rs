//! Worktree root discovery and the `.omc/` directory layout.
//!
//! Every persisted artifact lives under `<root>/.omc/`. The root is the
//! nearest ancestor of the process's starting directory that contains the
//! version-control metadata directory, cached for the process lifetime.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::worktree::session_id::validate_session_id;

/// Name of the artifact directory under the worktree root.
pub const OMC_DIR: &str = ".omc";

/// Subtrees created on demand under `.omc/`.
pub const LAYOUT_DIRS: &[&str] = &[
    "state",
    "state/sessions",
    "plans",
    "research",
    "drafts",
    "notepads",
    "logs",
    "scientist",
    "autopilot",
    "skills",
];

static DISCOVERED_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Handle to one worktree's `.omc/` tree.
#[derive(Debug, Clone)]
pub struct Worktree {
    root: PathBuf,
}

impl Worktree {
    /// Discover the worktree root by walking upward from the process's
    /// starting directory until `.git` appears. The result is cached per
    /// process; subsequent calls return the same root regardless of cwd
    /// changes.
    pub fn discover() -> DomainResult<Self> {
        if let Some(root) = DISCOVERED_ROOT.get() {
            return Ok(Self { root: root.clone() });
        }
        let cwd = std::env::current_dir()?;
        let root = find_root_from(&cwd)
            .ok_or_else(|| DomainError::ValidationFailed(format!(
                "no version-control root found above {}",
                cwd.display()
            )))?;
        let root = DISCOVERED_ROOT.get_or_init(|| root).clone();
        Ok(Self { root })
    }

    /// Open a worktree at an explicit root. Used by tests and by callers
    /// that already validated a directory.
    pub fn at_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn omc_dir(&self) -> PathBuf {
        self.root.join(OMC_DIR)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.omc_dir().join("state")
    }

    /// Resolve an `.omc/`-relative path, rejecting any traversal that would
    /// leave the worktree.
    pub fn resolve_omc_path(&self, rel: impl AsRef<Path>) -> DomainResult<PathBuf> {
        let rel = rel.as_ref();
        let normalized = normalize_relative(rel)?;
        Ok(self.omc_dir().join(normalized))
    }

    /// Create an `.omc/`-relative directory (and parents). Idempotent.
    pub fn ensure_omc_dir(&self, rel: impl AsRef<Path>) -> DomainResult<PathBuf> {
        let path = self.resolve_omc_path(rel)?;
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Create the full fixed layout. Idempotent.
    pub fn ensure_layout(&self) -> DomainResult<()> {
        for dir in LAYOUT_DIRS {
            self.ensure_omc_dir(dir)?;
        }
        Ok(())
    }

    /// Session-scoped state directory; the session id is validated before
    /// it becomes a path component.
    pub fn session_state_dir(&self, session_id: &str) -> DomainResult<PathBuf> {
        validate_session_id(session_id)?;
        self.resolve_omc_path(Path::new("state/sessions").join(session_id))
    }

    /// Path of the per-session state file for one mode.
    pub fn session_state_file(&self, session_id: &str, mode: &str) -> DomainResult<PathBuf> {
        let dir = self.session_state_dir(session_id)?;
        Ok(dir.join(format!("{mode}-state.json")))
    }

    pub fn project_memory_path(&self) -> PathBuf {
        self.omc_dir().join("project-memory.json")
    }

    pub fn notepad_path(&self) -> PathBuf {
        self.omc_dir().join("notepad.md")
    }

    pub fn swarm_db_path(&self) -> PathBuf {
        self.state_dir().join("swarm.db")
    }

    pub fn swarm_summary_path(&self) -> PathBuf {
        self.state_dir().join("swarm-summary.md")
    }

    /// Accept a user-supplied working directory only when it is contained
    /// within this worktree. The trusted root always comes from discovery,
    /// never from the input.
    pub fn validate_working_directory(
        &self,
        user_supplied: Option<&Path>,
    ) -> DomainResult<PathBuf> {
        let Some(candidate) = user_supplied else {
            return Ok(self.root.clone());
        };
        let absolute = if candidate.is_absolute() {
            normalize_absolute(candidate)
        } else {
            normalize_absolute(&self.root.join(candidate))
        };
        if absolute.starts_with(&self.root) {
            Ok(absolute)
        } else {
            Err(DomainError::PathEscape(candidate.display().to_string()))
        }
    }
}

fn find_root_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

/// Normalize a relative path: strip `.`, resolve `..` against preceding
/// components, and reject anything that climbs above the anchor.
fn normalize_relative(rel: &Path) -> DomainResult<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(DomainError::PathEscape(rel.display().to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(DomainError::PathEscape(rel.display().to_string()));
            }
        }
    }
    Ok(normalized)
}

/// Lexical normalization of an absolute path (no filesystem access, so a
/// `..` that would climb past the root saturates there).
fn normalize_absolute(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn worktree() -> (TempDir, Worktree) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let tree = Worktree::at_root(dir.path());
        (dir, tree)
    }

    #[test]
    fn test_resolve_contained_path() {
        let (_dir, tree) = worktree();
        let path = tree.resolve_omc_path("state/swarm.db").unwrap();
        assert!(path.starts_with(tree.omc_dir()));
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let (_dir, tree) = worktree();
        assert!(matches!(
            tree.resolve_omc_path("../outside"),
            Err(DomainError::PathEscape(_))
        ));
        assert!(matches!(
            tree.resolve_omc_path("state/../../outside"),
            Err(DomainError::PathEscape(_))
        ));
        assert!(matches!(
            tree.resolve_omc_path("/absolute"),
            Err(DomainError::PathEscape(_))
        ));
    }

    #[test]
    fn test_resolve_allows_internal_dotdot() {
        let (_dir, tree) = worktree();
        let path = tree.resolve_omc_path("state/sessions/../swarm.db").unwrap();
        assert_eq!(path, tree.omc_dir().join("state/swarm.db"));
    }

    #[test]
    fn test_ensure_layout_idempotent() {
        let (_dir, tree) = worktree();
        tree.ensure_layout().unwrap();
        tree.ensure_layout().unwrap();
        for dir in LAYOUT_DIRS {
            assert!(tree.omc_dir().join(dir).is_dir(), "{dir} missing");
        }
    }

    #[test]
    fn test_find_root_walks_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let root = find_root_from(&nested).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn test_validate_working_directory() {
        let (_dir, tree) = worktree();
        let inside = tree.root().join("src");
        assert_eq!(
            tree.validate_working_directory(Some(&inside)).unwrap(),
            inside
        );
        assert_eq!(
            tree.validate_working_directory(None).unwrap(),
            tree.root()
        );
        assert!(matches!(
            tree.validate_working_directory(Some(Path::new("/etc"))),
            Err(DomainError::PathEscape(_))
        ));
        let sneaky = tree.root().join("src/../../etc");
        assert!(matches!(
            tree.validate_working_directory(Some(&sneaky)),
            Err(DomainError::PathEscape(_))
        ));
    }

    #[test]
    fn test_session_state_file_rejects_traversal() {
        let (_dir, tree) = worktree();
        assert!(tree.session_state_file("../evil", "swarm").is_err());
        let path = tree.session_state_file("pid-1-2", "swarm").unwrap();
        assert!(path.ends_with("state/sessions/pid-1-2/swarm-state.json"));
    }
}
