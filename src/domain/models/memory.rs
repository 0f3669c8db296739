//! Project memory: lazily detected facts about the repository, persisted
//! as `.omc/project-memory.json` (schema 1.0.0).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MEMORY_SCHEMA_VERSION: &str = "1.0.0";

/// Bounded collection sizes.
pub const MAX_CUSTOM_NOTES: usize = 20;
pub const MAX_HOT_PATHS: usize = 50;
pub const MAX_USER_DIRECTIVES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub name: String,
    /// In `[0, 1]`; grows with the number of markers found.
    pub confidence: f64,
    /// Marker files that justified the detection, e.g. `Cargo.toml`.
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFramework {
    pub name: String,
    /// e.g. `web`, `test`, `build`.
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    pub languages: Vec<DetectedLanguage>,
    pub frameworks: Vec<DetectedFramework>,
    #[serde(rename = "packageManager", skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<String>,
    /// Raw script map as found (e.g. package.json `scripts`).
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

/// A frequently touched file, learned incrementally from tool outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotPath {
    pub path: String,
    pub touches: u64,
    #[serde(rename = "lastTouched")]
    pub last_touched: DateTime<Utc>,
}

/// A standing instruction from the user, priority-ordered (smaller first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDirective {
    pub directive: String,
    pub priority: i64,
    #[serde(rename = "addedAt")]
    pub added_at: DateTime<Utc>,
}

/// Top-level persisted memory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMemory {
    pub version: String,
    #[serde(rename = "lastScanned", skip_serializing_if = "Option::is_none")]
    pub last_scanned: Option<DateTime<Utc>>,
    #[serde(rename = "projectRoot")]
    pub project_root: String,
    #[serde(rename = "techStack", default)]
    pub tech_stack: TechStack,
    #[serde(default)]
    pub build: BuildCommands,
    #[serde(default)]
    pub conventions: Vec<String>,
    #[serde(default)]
    pub structure: Vec<String>,
    #[serde(rename = "customNotes", default)]
    pub custom_notes: Vec<String>,
    #[serde(rename = "directoryMap", default)]
    pub directory_map: BTreeMap<String, String>,
    #[serde(rename = "hotPaths", default)]
    pub hot_paths: Vec<HotPath>,
    #[serde(rename = "userDirectives", default)]
    pub user_directives: Vec<UserDirective>,
}

impl ProjectMemory {
    pub fn empty(project_root: impl Into<String>) -> Self {
        Self {
            version: MEMORY_SCHEMA_VERSION.to_string(),
            last_scanned: None,
            project_root: project_root.into(),
            tech_stack: TechStack::default(),
            build: BuildCommands::default(),
            conventions: Vec::new(),
            structure: Vec::new(),
            custom_notes: Vec::new(),
            directory_map: BTreeMap::new(),
            hot_paths: Vec::new(),
            user_directives: Vec::new(),
        }
    }

    /// Append a note, evicting the oldest entries beyond the ring bound.
    pub fn push_note(&mut self, note: impl Into<String>) {
        self.custom_notes.push(note.into());
        if self.custom_notes.len() > MAX_CUSTOM_NOTES {
            let excess = self.custom_notes.len() - MAX_CUSTOM_NOTES;
            self.custom_notes.drain(..excess);
        }
    }

    /// Insert a directive keeping priority order and the ring bound.
    pub fn push_directive(&mut self, directive: UserDirective) {
        self.user_directives.push(directive);
        self.user_directives.sort_by_key(|d| d.priority);
        self.user_directives.truncate(MAX_USER_DIRECTIVES);
    }

    /// Record a file touch; trims the coldest paths beyond the bound.
    pub fn touch_path(&mut self, path: &str, now: DateTime<Utc>) {
        if let Some(hot) = self.hot_paths.iter_mut().find(|h| h.path == path) {
            hot.touches += 1;
            hot.last_touched = now;
        } else {
            self.hot_paths.push(HotPath {
                path: path.to_string(),
                touches: 1,
                last_touched: now,
            });
        }
        if self.hot_paths.len() > MAX_HOT_PATHS {
            self.hot_paths.sort_by(|a, b| b.touches.cmp(&a.touches));
            self.hot_paths.truncate(MAX_HOT_PATHS);
        }
    }
}
