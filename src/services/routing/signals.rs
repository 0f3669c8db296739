//! Fast regex-driven signal extraction from task prompts.

use regex::Regex;

use crate::domain::models::{
    ContextSignals, Domain, ImpactScope, LexicalSignals, QuestionDepth, Reversibility,
    StructuralSignals, TaskSignals,
};

/// Hard cap on counted file mentions.
const MAX_FILE_MENTIONS: usize = 20;

/// Hard cap on estimated subtasks.
const MAX_SUBTASKS: usize = 10;

const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "architecture",
    "architect",
    "system design",
    "design pattern",
    "restructure",
    "modular",
    "microservice",
    "scalab",
];

const DEBUGGING_KEYWORDS: &[&str] = &[
    "debug",
    "bug",
    "broken",
    "crash",
    "regression",
    "not working",
    "failing",
    "stack trace",
];

const SIMPLE_KEYWORDS: &[&str] = &[
    "simple",
    "trivial",
    "quick",
    "typo",
    "rename",
    "small change",
    "minor",
    "one-line",
];

const RISK_KEYWORDS: &[&str] = &[
    "production",
    "critical",
    "security",
    "auth",
    "payment",
    "data loss",
    "migration",
    "breaking change",
];

/// Vague verbs that imply unstated requirements when no scope qualifier
/// narrows them.
const VAGUE_VERBS: &[&str] = &["improve", "clean up", "cleanup", "optimize", "polish", "tidy", "refactor"];

const SCOPE_QUALIFIERS: &[&str] = &["file", "function", "method", "class", "module", "line", "struct"];

/// Extract all three signal groups for one prompt.
pub fn extract_signals(prompt: &str, context: ContextSignals) -> TaskSignals {
    let lexical = extract_lexical(prompt);
    let structural = extract_structural(prompt, &lexical);
    TaskSignals {
        lexical,
        structural,
        context,
    }
}

pub fn extract_lexical(prompt: &str) -> LexicalSignals {
    let lower = prompt.to_lowercase();
    let word_count = prompt.split_whitespace().count();
    let file_mentions = count_file_mentions(prompt);
    let code_blocks = count_code_blocks(prompt);

    LexicalSignals {
        word_count,
        file_mentions,
        code_blocks,
        has_architecture_keywords: contains_any(&lower, ARCHITECTURE_KEYWORDS),
        has_debugging_keywords: contains_any(&lower, DEBUGGING_KEYWORDS),
        has_simple_keywords: contains_any(&lower, SIMPLE_KEYWORDS),
        has_risk_keywords: contains_any(&lower, RISK_KEYWORDS),
        question_depth: question_depth(&lower),
        has_implicit_requirements: has_implicit_requirements(&lower, file_mentions),
    }
}

pub fn extract_structural(prompt: &str, lexical: &LexicalSignals) -> StructuralSignals {
    let lower = prompt.to_lowercase();

    let estimated_subtasks = estimate_subtasks(prompt, &lower);
    let cross_file_dependencies = lexical.file_mentions >= 2
        || contains_any(
            &lower,
            &["across", "multiple files", "all files", "every file", "cross-file"],
        );

    let requires_tests = contains_any(&lower, &["test", "coverage", "assert"]);
    let domain = detect_domain(&lower);
    let requires_external_knowledge = contains_any(
        &lower,
        &["library", "sdk", "documentation", "upgrade", "dependency", "third-party"],
    );

    let reversibility = if lexical.has_risk_keywords
        || contains_any(&lower, &["delete", "drop table", "irreversible", "migration"])
    {
        Reversibility::Difficult
    } else if cross_file_dependencies || estimated_subtasks > 3 {
        Reversibility::Moderate
    } else {
        Reversibility::Easy
    };

    let impact_scope = if lexical.has_architecture_keywords
        || contains_any(
            &lower,
            &["across", "system-wide", "entire", "everywhere", "whole codebase", "multiple files"],
        ) {
        ImpactScope::SystemWide
    } else if cross_file_dependencies || lexical.file_mentions > 1 {
        ImpactScope::Module
    } else {
        ImpactScope::Local
    };

    StructuralSignals {
        estimated_subtasks,
        cross_file_dependencies,
        requires_tests,
        domain,
        requires_external_knowledge,
        reversibility,
        impact_scope,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Three regex families: extension-bearing paths, well-known source
/// directories, and backticked paths. Unique matches, capped.
fn count_file_mentions(prompt: &str) -> usize {
    let families = [
        r"[\w./-]+\.(?:rs|ts|tsx|js|jsx|py|go|java|rb|c|cpp|h|json|yaml|yml|toml|md|sql)\b",
        r"\b(?:src|lib|tests?|app|crates|packages)/[\w./-]+",
        r"`([^`\s]+/[^`\s]+)`",
    ];

    let mut seen = std::collections::BTreeSet::new();
    for pattern in families {
        let Ok(re) = Regex::new(pattern) else { continue };
        for m in re.find_iter(prompt) {
            seen.insert(m.as_str().trim_matches('`').to_string());
            if seen.len() >= MAX_FILE_MENTIONS {
                return MAX_FILE_MENTIONS;
            }
        }
    }
    seen.len()
}

/// Fenced blocks count fully; indented code lines count at half weight.
fn count_code_blocks(prompt: &str) -> usize {
    let fenced = prompt.matches("```").count() / 2;
    let indented_lines = prompt
        .lines()
        .filter(|line| line.starts_with("    ") && !line.trim().is_empty())
        .count();
    fenced + indented_lines / 2
}

fn question_depth(lower: &str) -> QuestionDepth {
    let word_present = |word: &str| {
        Regex::new(&format!(r"\b{word}\b"))
            .map(|re| re.is_match(lower))
            .unwrap_or(false)
    };
    if word_present("why") {
        QuestionDepth::Why
    } else if word_present("how") {
        QuestionDepth::How
    } else if word_present("what") {
        QuestionDepth::What
    } else if word_present("where") {
        QuestionDepth::Where
    } else {
        QuestionDepth::None
    }
}

fn has_implicit_requirements(lower: &str, file_mentions: usize) -> bool {
    contains_any(lower, VAGUE_VERBS)
        && file_mentions == 0
        && !contains_any(lower, SCOPE_QUALIFIERS)
}

/// 1 + bulleted lines + numbered lines + floor(and/2) + then-count, capped.
fn estimate_subtasks(prompt: &str, lower: &str) -> usize {
    let bullets = prompt
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("• ")
        })
        .count();
    let numbered = {
        let re = Regex::new(r"(?m)^\s*\d+[.)]\s").ok();
        re.map_or(0, |re| re.find_iter(prompt).count())
    };
    let and_count = lower.matches(" and ").count();
    let then_count = lower.matches(" then ").count();

    (1 + bullets + numbered + and_count / 2 + then_count).min(MAX_SUBTASKS)
}

fn detect_domain(lower: &str) -> Domain {
    // Most specific first; security wins over everything.
    if contains_any(lower, &["security", "vulnerability", "encrypt", "xss", "injection", "csrf"]) {
        Domain::Security
    } else if contains_any(lower, &["deploy", "docker", "kubernetes", "terraform", "pipeline", "ci/cd"]) {
        Domain::Infrastructure
    } else if contains_any(lower, &["api", "endpoint", "server", "database", "backend", "queue"]) {
        Domain::Backend
    } else if contains_any(lower, &["ui", "css", "component", "react", "frontend", "browser"]) {
        Domain::Frontend
    } else {
        Domain::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_signals() {
        let prompt = "why is the authentication broken across multiple files in production?";
        let signals = extract_signals(prompt, ContextSignals::default());

        assert_eq!(signals.lexical.question_depth, QuestionDepth::Why);
        assert!(signals.lexical.has_debugging_keywords);
        assert!(signals.lexical.has_risk_keywords);
        assert!(signals.structural.cross_file_dependencies);
        assert_eq!(signals.structural.reversibility, Reversibility::Difficult);
        assert_eq!(signals.structural.impact_scope, ImpactScope::SystemWide);
    }

    #[test]
    fn test_file_mentions_counted_and_capped() {
        let prompt = "update src/main.rs and src/lib.rs plus config.toml";
        let lexical = extract_lexical(prompt);
        assert!(lexical.file_mentions >= 3);

        let many: String = (0..40).map(|i| format!("f{i}.rs ")).collect();
        assert_eq!(extract_lexical(&many).file_mentions, MAX_FILE_MENTIONS);
    }

    #[test]
    fn test_code_block_count() {
        let prompt = "```rust\nfn a() {}\n```\nplain\n```\nmore\n```";
        assert_eq!(extract_lexical(prompt).code_blocks, 2);
    }

    #[test]
    fn test_question_depth_precedence() {
        assert_eq!(extract_lexical("why and how?").question_depth, QuestionDepth::Why);
        assert_eq!(extract_lexical("how does it work").question_depth, QuestionDepth::How);
        assert_eq!(extract_lexical("what is this").question_depth, QuestionDepth::What);
        assert_eq!(extract_lexical("where is it").question_depth, QuestionDepth::Where);
        assert_eq!(extract_lexical("fix the bug").question_depth, QuestionDepth::None);
    }

    #[test]
    fn test_implicit_requirements() {
        assert!(extract_lexical("improve the codebase").has_implicit_requirements);
        assert!(!extract_lexical("improve the parse function").has_implicit_requirements);
        assert!(!extract_lexical("improve src/parser.rs").has_implicit_requirements);
    }

    #[test]
    fn test_subtask_estimation() {
        let prompt = "do these:\n- first\n- second\n1. third\n2. fourth\nalso x and y and z then w";
        let lexical = extract_lexical(prompt);
        let structural = extract_structural(prompt, &lexical);
        // 1 + 2 bullets + 2 numbered + floor(2 "and"s / 2) + 1 "then" = 7
        assert_eq!(structural.estimated_subtasks, 7);
    }

    #[test]
    fn test_subtask_cap() {
        let prompt = "- a\n".repeat(30);
        let lexical = extract_lexical(&prompt);
        let structural = extract_structural(&prompt, &lexical);
        assert_eq!(structural.estimated_subtasks, MAX_SUBTASKS);
    }

    #[test]
    fn test_domain_detection() {
        let check = |prompt: &str| {
            let lexical = extract_lexical(prompt);
            extract_structural(prompt, &lexical).domain
        };
        assert_eq!(check("fix the xss vulnerability"), Domain::Security);
        assert_eq!(check("update the docker deploy pipeline"), Domain::Infrastructure);
        assert_eq!(check("add an api endpoint"), Domain::Backend);
        assert_eq!(check("restyle the react component"), Domain::Frontend);
        assert_eq!(check("rename a variable"), Domain::Generic);
    }
}
