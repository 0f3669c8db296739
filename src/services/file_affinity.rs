//! Bounded glob matching for file-scope affinity claiming.
//!
//! Semantics: `*` matches anything except the path separator, `**` matches
//! any sequence including separators, `?` matches a single non-separator
//! character. Patterns longer than 500 characters or containing three or
//! more consecutive asterisks fall back to exact equality, which bounds the
//! compiled automaton. Matching is symmetric: agent patterns are tried
//! against task paths and task patterns against agent paths.

use regex::Regex;

use crate::domain::models::SwarmTask;

/// Pattern length above which matching degrades to exact equality.
const MAX_PATTERN_LEN: usize = 500;

/// Match a bounded glob `pattern` against `path`.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    if pattern.len() > MAX_PATTERN_LEN || pattern.contains("***") {
        return pattern == path;
    }
    match compile(pattern) {
        Some(re) => re.is_match(path),
        None => pattern == path,
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    let mut regex = String::with_capacity(pattern.len() * 2 + 2);
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` also swallows the separator so `src/**/x`
                    // matches `src/x`.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).ok()
}

/// Whether any of the agent's patterns overlaps the task's file scope, in
/// either direction.
pub fn task_matches_patterns(task: &SwarmTask, agent_patterns: &[String]) -> bool {
    let owned = task.owned_files.as_deref().unwrap_or(&[]);
    let task_patterns = task.file_patterns.as_deref().unwrap_or(&[]);

    for agent_pattern in agent_patterns {
        // Agent pattern vs concrete task paths.
        if owned.iter().any(|path| glob_match(agent_pattern, path)) {
            return true;
        }
        // Task pattern vs agent path, and pattern-on-pattern equality.
        if task_patterns.iter().any(|task_pattern| {
            glob_match(task_pattern, agent_pattern) || glob_match(agent_pattern, task_pattern)
        }) {
            return true;
        }
    }
    false
}

/// Whether the task carries any file-scope metadata at all. Tasks without
/// metadata never match and are only reachable through the fallback claim.
pub fn has_file_scope(task: &SwarmTask) -> bool {
    task.owned_files.as_ref().is_some_and(|f| !f.is_empty())
        || task.file_patterns.as_ref().is_some_and(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_star_stops_at_separator() {
        assert!(glob_match("src/auth/*", "src/auth/login.ts"));
        assert!(!glob_match("src/auth/*", "src/auth/nested/login.ts"));
        assert!(!glob_match("src/*", "src/auth/login.ts"));
    }

    #[test]
    fn test_double_star_crosses_separators() {
        assert!(glob_match("src/**", "src/auth/nested/login.ts"));
        assert!(glob_match("src/**/login.ts", "src/auth/login.ts"));
        assert!(glob_match("src/**/login.ts", "src/login.ts"));
        assert!(glob_match("**/*.rs", "a/b/c.rs"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(!glob_match("file?.txt", "file10.txt"));
        assert!(!glob_match("file?.txt", "file/.txt"));
    }

    #[test]
    fn test_literal_specials_are_escaped() {
        assert!(glob_match("src/a+b.rs", "src/a+b.rs"));
        assert!(!glob_match("src/a+b.rs", "src/aab.rs"));
        assert!(glob_match("src/(x).rs", "src/(x).rs"));
    }

    #[test]
    fn test_pathological_patterns_fall_back_to_equality() {
        let triple = "src/***/x";
        assert!(!glob_match(triple, "src/anything/x"));
        assert!(glob_match(triple, "src/***/x"));

        let long = "a".repeat(501);
        assert!(!glob_match(&long, "b"));
        assert!(glob_match(&long, &long));
    }

    #[test]
    fn test_task_matching_owned_files() {
        let task = SwarmTask::new("task-1", "auth work")
            .with_owned_files(vec!["src/auth/login.ts".to_string()]);
        assert!(task_matches_patterns(&task, &["src/auth/*".to_string()]));
        assert!(!task_matches_patterns(&task, &["src/hooks/*".to_string()]));
    }

    #[test]
    fn test_task_matching_is_symmetric() {
        // The task declares a pattern; the agent supplies a concrete path.
        let task = SwarmTask::new("task-1", "api work")
            .with_file_patterns(vec!["src/api/**".to_string()]);
        assert!(task_matches_patterns(&task, &["src/api/routes.ts".to_string()]));
    }

    #[test]
    fn test_task_without_scope_never_matches() {
        let task = SwarmTask::new("task-1", "anything");
        assert!(!has_file_scope(&task));
        assert!(!task_matches_patterns(&task, &["**".to_string()]));
    }

    proptest! {
        #[test]
        fn prop_exact_paths_always_match_themselves(
            path in "[a-z]{1,8}(/[a-z]{1,8}){0,4}"
        ) {
            prop_assert!(glob_match(&path, &path));
        }

        #[test]
        fn prop_double_star_matches_any_path(
            path in "[a-z]{1,8}(/[a-z]{1,8}){0,4}"
        ) {
            prop_assert!(glob_match("**", &path));
        }

        #[test]
        fn prop_no_pattern_panics(
            pattern in "[a-z*?/.]{0,40}",
            path in "[a-z/.]{0,40}"
        ) {
            let _ = glob_match(&pattern, &path);
        }
    }
}
