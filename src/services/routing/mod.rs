//! Model routing: deterministic tier classification and model selection.

pub mod external;
pub mod rules;
pub mod scoring;
pub mod signals;

pub use external::{
    provider_timeout_secs, resolve_external_model, ExternalRequest, ExternalRoutingConfig,
};
pub use rules::{default_rules, RoutingRule, RuleAction};
pub use scoring::{score_signals, ScoreBreakdown, HIGH_THRESHOLD, MEDIUM_THRESHOLD};
pub use signals::extract_signals;

use crate::domain::models::{RoutingConfig, RoutingContext, RoutingDecision, Tier};

/// Task router: signals -> score -> rules -> model.
pub struct TaskRouter {
    config: RoutingConfig,
    rules: Vec<RoutingRule>,
}

impl TaskRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RoutingConfig::default())
    }

    /// Produce a routing decision. Pure with respect to `(prompt, context,
    /// config)`: repeat calls yield identical decisions.
    pub fn route_task(&self, prompt: &str, context: &RoutingContext) -> RoutingDecision {
        let signals = extract_signals(prompt, context.signals.clone());
        let breakdown = score_signals(&signals);

        let mut reasons: Vec<String> = vec![format!(
            "score {} -> {}",
            breakdown.total,
            breakdown.tier.as_str()
        )];
        for component in &breakdown.components {
            reasons.push(format!("{} {:+}", component.name, component.points));
        }

        let mut tier = breakdown.tier;
        let mut escalated = false;
        let original_tier = tier;
        let mut escalation_allowed = true;
        let mut explicit_model = None;

        if let Some(rule) = rules::first_match(&self.rules, context, &signals) {
            reasons.push(format!("rule {}: {}", rule.name, rule.reason));
            match rule.action {
                RuleAction::UseExplicitModel => {
                    explicit_model = context.explicit_model.clone();
                }
                RuleAction::ForceTier(forced) => {
                    tier = forced;
                    escalation_allowed = false;
                }
                RuleAction::MinimumTier(minimum) => tier = tier.max(minimum),
                RuleAction::VetoEscalation => escalation_allowed = false,
            }
        }

        // Failure-driven escalation: one tier per routing pass, vetoable.
        if escalation_allowed && explicit_model.is_none() && context.signals.previous_failures > 0 {
            if let Some(next) = next_tier(tier) {
                tier = next;
                escalated = true;
                reasons.push("escalated after previous failures".to_string());
            }
        }

        if !self.config.enabled {
            tier = Tier::High;
            reasons.push("routing disabled; defaulting to the strongest model".to_string());
        }

        let (model, model_type) = match explicit_model {
            Some(model) => (model, "external".to_string()),
            None => (self.model_for_tier(tier), "standard".to_string()),
        };

        RoutingDecision {
            model,
            model_type,
            tier,
            confidence: breakdown.confidence,
            reasons,
            adapted_prompt: None,
            escalated,
            original_tier: escalated.then_some(original_tier),
        }
    }

    fn model_for_tier(&self, tier: Tier) -> String {
        match tier {
            Tier::Low => self.config.low_model.clone(),
            Tier::Medium => self.config.medium_model.clone(),
            Tier::High => self.config.high_model.clone(),
        }
    }
}

impl Default for TaskRouter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn next_tier(tier: Tier) -> Option<Tier> {
    match tier {
        Tier::Low => Some(Tier::Medium),
        Tier::Medium => Some(Tier::High),
        Tier::High => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ContextSignals;

    #[test]
    fn test_route_is_deterministic() {
        let router = TaskRouter::with_defaults();
        let context = RoutingContext::default();
        let prompt = "why is the authentication broken across multiple files in production?";
        let first = router.route_task(prompt, &context);
        let second = router.route_task(prompt, &context);
        assert_eq!(first, second);
    }

    #[test]
    fn test_scenario_high() {
        let router = TaskRouter::with_defaults();
        let decision = router.route_task(
            "why is the authentication broken across multiple files in production?",
            &RoutingContext::default(),
        );
        assert_eq!(decision.tier, Tier::High);
        assert_eq!(decision.model, "opus");
        assert!(!decision.escalated);
    }

    #[test]
    fn test_simple_prompt_low() {
        let router = TaskRouter::with_defaults();
        let decision = router.route_task("quick typo fix", &RoutingContext::default());
        assert_eq!(decision.tier, Tier::Low);
        assert_eq!(decision.model, "haiku");
    }

    #[test]
    fn test_failure_escalation() {
        let router = TaskRouter::with_defaults();
        let context = RoutingContext {
            signals: ContextSignals {
                previous_failures: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let decision = router.route_task("implement the parser module", &context);
        assert!(decision.escalated);
        assert!(decision.original_tier.is_some());
        assert!(decision.tier > decision.original_tier.unwrap());
    }

    #[test]
    fn test_trivial_rule_blocks_escalation() {
        let router = TaskRouter::with_defaults();
        let context = RoutingContext {
            signals: ContextSignals {
                previous_failures: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let decision = router.route_task("quick typo fix", &context);
        assert!(!decision.escalated);
        assert_eq!(decision.tier, Tier::Low);
    }

    #[test]
    fn test_explicit_model_short_circuit() {
        let router = TaskRouter::with_defaults();
        let context = RoutingContext {
            explicit_model: Some("gpt-5-codex".to_string()),
            ..Default::default()
        };
        let decision = router.route_task("anything at all", &context);
        assert_eq!(decision.model, "gpt-5-codex");
        assert_eq!(decision.model_type, "external");
    }

    #[test]
    fn test_architect_floor() {
        let router = TaskRouter::with_defaults();
        let context = RoutingContext {
            agent_type: Some("architect".to_string()),
            ..Default::default()
        };
        let decision = router.route_task("tiny task", &context);
        assert_eq!(decision.tier, Tier::High);
        assert_eq!(decision.model, "opus");
    }

    #[test]
    fn test_disabled_routing_uses_high() {
        let router = TaskRouter::new(RoutingConfig {
            enabled: false,
            ..Default::default()
        });
        let decision = router.route_task("quick typo fix", &RoutingContext::default());
        assert_eq!(decision.model, "opus");
    }
}
