//! Model-routing decision types and extracted task signals.

use serde::{Deserialize, Serialize};

/// Complexity tier selecting among three model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "LOW",
            Tier::Medium => "MEDIUM",
            Tier::High => "HIGH",
        }
    }
}

/// Depth of the leading question word, ordered by how much reasoning the
/// answer typically requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionDepth {
    None,
    Where,
    What,
    How,
    Why,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Generic,
    Frontend,
    Backend,
    Infrastructure,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reversibility {
    Easy,
    Moderate,
    Difficult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpactScope {
    Local,
    Module,
    SystemWide,
}

/// Fast regex-driven lexical signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalSignals {
    pub word_count: usize,
    /// Capped at 20.
    pub file_mentions: usize,
    pub code_blocks: usize,
    pub has_architecture_keywords: bool,
    pub has_debugging_keywords: bool,
    pub has_simple_keywords: bool,
    pub has_risk_keywords: bool,
    pub question_depth: QuestionDepth,
    /// Vague verbs like "improve" or "clean up" without a scope qualifier.
    pub has_implicit_requirements: bool,
}

/// Structural task-shape signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSignals {
    /// 1 + bullets + numbered lines + floor(and/2) + then-count, capped at 10.
    pub estimated_subtasks: usize,
    pub cross_file_dependencies: bool,
    pub requires_tests: bool,
    pub domain: Domain,
    pub requires_external_knowledge: bool,
    pub reversibility: Reversibility,
    pub impact_scope: ImpactScope,
}

/// Conversation-context signals supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSignals {
    pub previous_failures: usize,
    pub conversation_turns: usize,
    pub plan_complexity: usize,
    pub remaining_tasks: usize,
    pub agent_chain_depth: usize,
}

/// All three signal groups together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignals {
    pub lexical: LexicalSignals,
    pub structural: StructuralSignals,
    pub context: ContextSignals,
}

/// Caller-supplied routing context.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub agent_type: Option<String>,
    pub explicit_model: Option<String>,
    pub signals: ContextSignals,
}

/// The deterministic routing result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub model: String,
    pub model_type: String,
    pub tier: Tier,
    /// In `[0, 1]`, rounded to two decimals.
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapted_prompt: Option<String>,
    pub escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_tier: Option<Tier>,
}

/// External model providers reachable through the routing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "codex" => Some(Provider::Codex),
            "gemini" => Some(Provider::Gemini),
            _ => None,
        }
    }

    /// Infer the provider from a model name. Names containing `gemini`
    /// belong to Gemini; everything else routes to the primary provider.
    pub fn infer_from_model(model: &str) -> Self {
        if model.to_lowercase().contains("gemini") {
            Provider::Gemini
        } else {
            Provider::Codex
        }
    }
}

/// A model preference entry in the external routing config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPreference {
    pub provider: Provider,
    pub model: String,
}

/// Resolved external model plus its deduplicated fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResolution {
    pub provider: Provider,
    pub model: String,
    /// Resolved model first, then the provider's default chain, first
    /// occurrence wins.
    pub fallback_chain: Vec<String>,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Low < Tier::Medium);
        assert!(Tier::Medium < Tier::High);
    }

    #[test]
    fn test_question_depth_ordering() {
        assert!(QuestionDepth::Why > QuestionDepth::How);
        assert!(QuestionDepth::How > QuestionDepth::What);
        assert!(QuestionDepth::What > QuestionDepth::Where);
        assert!(QuestionDepth::Where > QuestionDepth::None);
    }

    #[test]
    fn test_provider_inference() {
        assert_eq!(Provider::infer_from_model("gemini-2.5-pro"), Provider::Gemini);
        assert_eq!(Provider::infer_from_model("gpt-5-codex"), Provider::Codex);
        assert_eq!(Provider::infer_from_model("o4-mini"), Provider::Codex);
    }

    #[test]
    fn test_tier_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Tier::High).unwrap(), "\"HIGH\"");
    }
}
