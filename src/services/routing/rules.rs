//! Priority-ordered rule engine layered over the scoring result.
//!
//! The first matching rule wins. Rules can force or floor the tier, veto
//! failure-driven escalation, or short-circuit to an explicitly requested
//! model.

use crate::domain::models::{RoutingContext, TaskSignals, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Use `context.explicit_model` verbatim.
    UseExplicitModel,
    /// Replace the scored tier; forced tiers also suppress escalation.
    ForceTier(Tier),
    /// Raise the tier to at least this level.
    MinimumTier(Tier),
    /// Keep the scored tier and suppress failure-driven escalation.
    VetoEscalation,
}

pub struct RoutingRule {
    pub name: &'static str,
    pub priority: i32,
    pub predicate: fn(&RoutingContext, &TaskSignals) -> bool,
    pub action: RuleAction,
    pub reason: &'static str,
}

/// The built-in rule set, sorted by descending priority.
pub fn default_rules() -> Vec<RoutingRule> {
    let mut rules = vec![
        RoutingRule {
            name: "explicit-model",
            priority: 100,
            predicate: |ctx, _| ctx.explicit_model.is_some(),
            action: RuleAction::UseExplicitModel,
            reason: "explicit model requested",
        },
        RoutingRule {
            name: "architect-minimum",
            priority: 80,
            predicate: |ctx, _| ctx.agent_type.as_deref() == Some("architect"),
            action: RuleAction::MinimumTier(Tier::High),
            reason: "architect agents require the strongest model",
        },
        RoutingRule {
            name: "reviewer-minimum",
            priority: 70,
            predicate: |ctx, _| ctx.agent_type.as_deref() == Some("reviewer"),
            action: RuleAction::MinimumTier(Tier::Medium),
            reason: "reviewers require at least the medium model",
        },
        RoutingRule {
            name: "trivial-pinned-low",
            priority: 50,
            predicate: |_, signals| {
                signals.lexical.has_simple_keywords
                    && signals.lexical.word_count < 50
                    && !signals.lexical.has_architecture_keywords
                    && !signals.lexical.has_risk_keywords
            },
            action: RuleAction::ForceTier(Tier::Low),
            reason: "short task with simple markers pinned to the fast model",
        },
    ];
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

/// First matching rule for this context and signal set.
pub fn first_match<'a>(
    rules: &'a [RoutingRule],
    context: &RoutingContext,
    signals: &TaskSignals,
) -> Option<&'a RoutingRule> {
    rules.iter().find(|rule| (rule.predicate)(context, signals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ContextSignals;
    use crate::services::routing::signals::extract_signals;

    fn signals(prompt: &str) -> TaskSignals {
        extract_signals(prompt, ContextSignals::default())
    }

    #[test]
    fn test_explicit_model_wins_over_agent_type() {
        let rules = default_rules();
        let context = RoutingContext {
            agent_type: Some("architect".to_string()),
            explicit_model: Some("gpt-5-codex".to_string()),
            ..Default::default()
        };
        let rule = first_match(&rules, &context, &signals("anything")).unwrap();
        assert_eq!(rule.name, "explicit-model");
        assert_eq!(rule.action, RuleAction::UseExplicitModel);
    }

    #[test]
    fn test_architect_minimum() {
        let rules = default_rules();
        let context = RoutingContext {
            agent_type: Some("architect".to_string()),
            ..Default::default()
        };
        let rule = first_match(&rules, &context, &signals("quick typo fix")).unwrap();
        assert_eq!(rule.action, RuleAction::MinimumTier(Tier::High));
    }

    #[test]
    fn test_trivial_pinned_low() {
        let rules = default_rules();
        let context = RoutingContext::default();
        let rule = first_match(&rules, &context, &signals("quick typo fix")).unwrap();
        assert_eq!(rule.action, RuleAction::ForceTier(Tier::Low));
    }

    #[test]
    fn test_no_rule_for_plain_task() {
        let rules = default_rules();
        let context = RoutingContext::default();
        assert!(first_match(&rules, &context, &signals("implement the parser")).is_none());
    }
}
