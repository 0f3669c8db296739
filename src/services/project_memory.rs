//! Project memory: lazily detected repository facts, persisted under
//! `.omc/project-memory.json` and injected into the host on session start.

use chrono::Utc;
use serde_json::Value;
use std::path::Path;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    BuildCommands, DetectedFramework, DetectedLanguage, ProjectMemory, TechStack, UserDirective,
};
use crate::infrastructure::worktree::{atomic_write_json, safe_read_json, Worktree};

/// Marker files that identify a language, with the confidence each one
/// contributes.
const LANGUAGE_MARKERS: &[(&str, &str, f64)] = &[
    ("Cargo.toml", "rust", 0.6),
    ("Cargo.lock", "rust", 0.3),
    ("package.json", "javascript", 0.5),
    ("tsconfig.json", "typescript", 0.6),
    ("pyproject.toml", "python", 0.6),
    ("requirements.txt", "python", 0.4),
    ("go.mod", "go", 0.6),
    ("pom.xml", "java", 0.6),
    ("Gemfile", "ruby", 0.6),
];

const PACKAGE_MANAGER_MARKERS: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("yarn.lock", "yarn"),
    ("bun.lockb", "bun"),
    ("package-lock.json", "npm"),
    ("Cargo.lock", "cargo"),
    ("poetry.lock", "poetry"),
    ("uv.lock", "uv"),
    ("go.sum", "go"),
];

pub struct ProjectMemoryService {
    worktree: Worktree,
}

impl ProjectMemoryService {
    pub fn new(worktree: Worktree) -> Self {
        Self { worktree }
    }

    /// Load the persisted memory, or an empty document when absent or
    /// unreadable.
    pub fn load(&self) -> ProjectMemory {
        safe_read_json(&self.worktree.project_memory_path())
            .unwrap_or_else(|| ProjectMemory::empty(self.worktree.root().display().to_string()))
    }

    pub fn save(&self, memory: &ProjectMemory) -> DomainResult<()> {
        atomic_write_json(&self.worktree.project_memory_path(), memory)
    }

    /// Load the memory, scanning the repository first if it was never
    /// scanned. The scan is lazy: repeat sessions reuse the stored result.
    pub fn load_or_scan(&self) -> ProjectMemory {
        let mut memory = self.load();
        if memory.last_scanned.is_none() {
            self.scan_into(&mut memory);
            if let Err(err) = self.save(&memory) {
                tracing::debug!(error = %err, "could not persist project memory");
            }
        }
        memory
    }

    /// Re-detect tech stack, build commands, and structure from the
    /// worktree.
    pub fn scan_into(&self, memory: &mut ProjectMemory) {
        let root = self.worktree.root();
        memory.tech_stack = detect_tech_stack(root);
        memory.build = detect_build_commands(root);
        memory.structure = top_level_structure(root);
        memory.last_scanned = Some(Utc::now());
        tracing::debug!(
            languages = memory.tech_stack.languages.len(),
            "project memory scanned"
        );
    }

    /// Learn from one tool invocation: file paths touched by read/edit
    /// tools feed the hot-path ring.
    pub fn learn_from_tool(&self, tool_name: &str, tool_input: Option<&Value>) {
        let lower = tool_name.to_lowercase();
        if !matches!(lower.as_str(), "read" | "edit" | "write" | "grep" | "glob") {
            return;
        }
        let Some(path) = tool_input.and_then(extract_path) else {
            return;
        };

        let mut memory = self.load();
        let relative = path
            .strip_prefix(&memory.project_root)
            .map(|p| p.trim_start_matches('/').to_string())
            .unwrap_or(path);
        memory.touch_path(&relative, Utc::now());
        if let Err(err) = self.save(&memory) {
            tracing::debug!(error = %err, "could not persist hot path");
        }
    }

    pub fn add_note(&self, note: &str) -> DomainResult<()> {
        let mut memory = self.load();
        memory.push_note(note);
        self.save(&memory)
    }

    pub fn add_directive(&self, directive: &str, priority: i64) -> DomainResult<()> {
        let mut memory = self.load();
        memory.push_directive(UserDirective {
            directive: directive.to_string(),
            priority,
            added_at: Utc::now(),
        });
        self.save(&memory)
    }

    /// Render the session-start injection block.
    pub fn summary(&self, memory: &ProjectMemory) -> String {
        let mut out = String::from("# Project memory\n\n");

        if !memory.tech_stack.languages.is_empty() {
            let names: Vec<&str> = memory
                .tech_stack
                .languages
                .iter()
                .map(|l| l.name.as_str())
                .collect();
            out.push_str(&format!("Languages: {}\n", names.join(", ")));
        }
        if let Some(pm) = &memory.tech_stack.package_manager {
            out.push_str(&format!("Package manager: {pm}\n"));
        }
        if let Some(build) = &memory.build.build {
            out.push_str(&format!("Build: `{build}`\n"));
        }
        if let Some(test) = &memory.build.test {
            out.push_str(&format!("Test: `{test}`\n"));
        }
        if !memory.conventions.is_empty() {
            out.push_str("\nConventions:\n");
            for convention in &memory.conventions {
                out.push_str(&format!("- {convention}\n"));
            }
        }
        if !memory.hot_paths.is_empty() {
            out.push_str("\nFrequently touched files:\n");
            for hot in memory.hot_paths.iter().take(5) {
                out.push_str(&format!("- {} ({} touches)\n", hot.path, hot.touches));
            }
        }
        if !memory.user_directives.is_empty() {
            out.push_str("\nStanding directives:\n");
            for directive in &memory.user_directives {
                out.push_str(&format!("- {}\n", directive.directive));
            }
        }
        out
    }
}

fn detect_tech_stack(root: &Path) -> TechStack {
    let mut languages: std::collections::BTreeMap<String, DetectedLanguage> = Default::default();
    for (marker, language, confidence) in LANGUAGE_MARKERS {
        if root.join(marker).exists() {
            let entry = languages
                .entry((*language).to_string())
                .or_insert_with(|| DetectedLanguage {
                    name: (*language).to_string(),
                    confidence: 0.0,
                    markers: Vec::new(),
                });
            entry.confidence = (entry.confidence + confidence).min(1.0);
            entry.markers.push((*marker).to_string());
        }
    }

    let package_manager = PACKAGE_MANAGER_MARKERS
        .iter()
        .find(|(marker, _)| root.join(marker).exists())
        .map(|(_, name)| (*name).to_string());

    let mut frameworks = Vec::new();
    if let Some(scripts) = read_package_json(root) {
        let deps = scripts
            .get("dependencies")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (name, category) in [
            ("react", "web"),
            ("vue", "web"),
            ("express", "server"),
            ("next", "web"),
            ("vitest", "test"),
            ("jest", "test"),
        ] {
            if deps.contains_key(name) {
                frameworks.push(DetectedFramework {
                    name: name.to_string(),
                    category: category.to_string(),
                });
            }
        }
    }

    let runtime = if root.join("Cargo.toml").exists() {
        Some("rust".to_string())
    } else if root.join("package.json").exists() {
        Some("node".to_string())
    } else if root.join("pyproject.toml").exists() || root.join("requirements.txt").exists() {
        Some("python".to_string())
    } else {
        None
    };

    TechStack {
        languages: languages.into_values().collect(),
        frameworks,
        package_manager,
        runtime,
    }
}

fn detect_build_commands(root: &Path) -> BuildCommands {
    let mut build = BuildCommands::default();

    if let Some(package) = read_package_json(root) {
        if let Some(scripts) = package.get("scripts").and_then(Value::as_object) {
            for (name, command) in scripts {
                if let Some(command) = command.as_str() {
                    build.scripts.insert(name.clone(), command.to_string());
                }
            }
            let runner = "npm run";
            build.build = scripts.get("build").map(|_| format!("{runner} build"));
            build.test = scripts.get("test").map(|_| format!("{runner} test"));
            build.lint = scripts.get("lint").map(|_| format!("{runner} lint"));
            build.dev = scripts.get("dev").map(|_| format!("{runner} dev"));
        }
    }

    if root.join("Cargo.toml").exists() {
        build.build.get_or_insert_with(|| "cargo build".to_string());
        build.test.get_or_insert_with(|| "cargo test".to_string());
        build.lint.get_or_insert_with(|| "cargo clippy".to_string());
    }

    build
}

fn read_package_json(root: &Path) -> Option<Value> {
    safe_read_json(&root.join("package.json"))
}

fn top_level_structure(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.') && name != "node_modules" && name != "target")
        .collect();
    dirs.sort();
    dirs
}

fn extract_path(tool_input: &Value) -> Option<String> {
    for key in ["file_path", "filePath", "path", "notebook_path"] {
        if let Some(path) = tool_input.get(key).and_then(Value::as_str) {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn service() -> (TempDir, ProjectMemoryService) {
        let dir = TempDir::new().unwrap();
        let tree = Worktree::at_root(dir.path());
        tree.ensure_omc_dir("state").unwrap();
        (dir, ProjectMemoryService::new(tree))
    }

    #[test]
    fn test_scan_detects_rust_project() {
        let (dir, service) = service();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"").unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let memory = service.load_or_scan();
        let rust = memory
            .tech_stack
            .languages
            .iter()
            .find(|l| l.name == "rust")
            .expect("rust detected");
        assert!(rust.confidence > 0.6);
        assert_eq!(memory.tech_stack.package_manager.as_deref(), Some("cargo"));
        assert_eq!(memory.build.test.as_deref(), Some("cargo test"));
        assert!(memory.structure.contains(&"src".to_string()));
    }

    #[test]
    fn test_scan_reads_package_scripts() {
        let (dir, service) = service();
        std::fs::write(
            dir.path().join("package.json"),
            json!({
                "scripts": {"build": "tsc", "test": "vitest run"},
                "dependencies": {"react": "^19.0.0"}
            })
            .to_string(),
        )
        .unwrap();

        let memory = service.load_or_scan();
        assert_eq!(memory.build.build.as_deref(), Some("npm run build"));
        assert_eq!(memory.build.scripts.get("test").map(String::as_str), Some("vitest run"));
        assert!(memory
            .tech_stack
            .frameworks
            .iter()
            .any(|f| f.name == "react"));
    }

    #[test]
    fn test_scan_is_lazy() {
        let (dir, service) = service();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let first = service.load_or_scan();
        // Remove the marker; a second load must not rescan.
        std::fs::remove_file(dir.path().join("Cargo.toml")).unwrap();
        let second = service.load_or_scan();
        assert_eq!(first.tech_stack, second.tech_stack);
    }

    #[test]
    fn test_learn_from_tool_records_hot_path() {
        let (dir, service) = service();
        let input = json!({"file_path": format!("{}/src/main.rs", dir.path().display())});
        service.learn_from_tool("Read", Some(&input));
        service.learn_from_tool("Edit", Some(&input));
        // Untracked tool is ignored.
        service.learn_from_tool("Bash", Some(&json!({"command": "ls"})));

        let memory = service.load();
        assert_eq!(memory.hot_paths.len(), 1);
        assert_eq!(memory.hot_paths[0].path, "src/main.rs");
        assert_eq!(memory.hot_paths[0].touches, 2);
    }

    #[test]
    fn test_summary_renders_key_facts() {
        let (dir, service) = service();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let memory = service.load_or_scan();
        service.add_directive("never touch vendored code", 0).unwrap();

        let summary = service.summary(&service.load());
        assert!(summary.contains("rust"));
        assert!(summary.contains("cargo test"));
        assert!(summary.contains("never touch vendored code"));
        let _ = memory;
    }
}
