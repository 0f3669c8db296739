//! Weighted scoring from signals to complexity tier.

use crate::domain::models::{
    Domain, ImpactScope, QuestionDepth, Reversibility, TaskSignals, Tier,
};

/// Score at or above which a task is HIGH.
pub const HIGH_THRESHOLD: i32 = 8;

/// Score at or above which a task is MEDIUM.
pub const MEDIUM_THRESHOLD: i32 = 4;

/// Cap on the previous-failure contribution regardless of count.
const MAX_FAILURE_CONTRIBUTION: i32 = 4;

/// One scored signal with its contribution, kept for decision reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreComponent {
    pub name: &'static str,
    pub points: i32,
}

/// Result of scoring: total, tier, confidence, and the contributing
/// components.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub total: i32,
    pub tier: Tier,
    pub confidence: f64,
    pub components: Vec<ScoreComponent>,
}

/// Apply the fixed weight table to all three signal groups.
pub fn score_signals(signals: &TaskSignals) -> ScoreBreakdown {
    let mut components = Vec::new();
    let mut add = |name: &'static str, points: i32| {
        if points != 0 {
            components.push(ScoreComponent { name, points });
        }
    };

    let lex = &signals.lexical;
    if lex.has_architecture_keywords {
        add("architecture keywords", 3);
    }
    if lex.has_debugging_keywords {
        add("debugging keywords", 2);
    }
    if lex.has_risk_keywords {
        add("risk keywords", 2);
    }
    if lex.has_simple_keywords {
        add("simple keywords", -2);
    }
    match lex.question_depth {
        QuestionDepth::Why => add("why-question", 2),
        QuestionDepth::How => add("how-question", 1),
        QuestionDepth::What | QuestionDepth::Where | QuestionDepth::None => {}
    }
    if lex.has_implicit_requirements {
        add("implicit requirements", 1);
    }
    if lex.word_count > 100 {
        add("long prompt", 1);
    } else if lex.word_count < 20 {
        add("short prompt", -1);
    }
    if lex.code_blocks >= 2 {
        add("code blocks", 1);
    }
    if lex.file_mentions >= 3 {
        add("many file mentions", 1);
    }

    let st = &signals.structural;
    match st.estimated_subtasks {
        0..=1 => {}
        2 => add("two subtasks", 1),
        3..=4 => add("several subtasks", 2),
        _ => add("many subtasks", 3),
    }
    if st.cross_file_dependencies {
        add("cross-file dependencies", 2);
    }
    if st.requires_tests {
        add("test requirements", 1);
    }
    match st.domain {
        Domain::Security => add("security domain", 2),
        Domain::Infrastructure => add("infrastructure domain", 1),
        Domain::Backend | Domain::Frontend | Domain::Generic => {}
    }
    if st.requires_external_knowledge {
        add("external knowledge", 1);
    }
    match st.reversibility {
        Reversibility::Difficult => add("difficult to reverse", 2),
        Reversibility::Moderate => add("moderately reversible", 1),
        Reversibility::Easy => {}
    }
    match st.impact_scope {
        ImpactScope::SystemWide => add("system-wide impact", 3),
        ImpactScope::Module => add("module impact", 1),
        ImpactScope::Local => {}
    }

    let ctx = &signals.context;
    if ctx.previous_failures > 0 {
        let points = ((ctx.previous_failures as i32) * 2).min(MAX_FAILURE_CONTRIBUTION);
        add("previous failures", points);
    }
    if ctx.conversation_turns > 10 {
        add("long conversation", 1);
    }
    if ctx.plan_complexity > 5 {
        add("complex plan", 1);
    }
    if ctx.remaining_tasks > 5 {
        add("many remaining tasks", 1);
    }
    if ctx.agent_chain_depth >= 2 {
        add("deep agent chain", 1);
    }

    let total: i32 = components.iter().map(|c| c.points).sum();
    let tier = tier_for_score(total);
    let confidence = confidence_for_score(total, tier);

    ScoreBreakdown {
        total,
        tier,
        confidence,
        components,
    }
}

pub fn tier_for_score(score: i32) -> Tier {
    if score >= HIGH_THRESHOLD {
        Tier::High
    } else if score >= MEDIUM_THRESHOLD {
        Tier::Medium
    } else {
        Tier::Low
    }
}

/// Confidence grows with distance from the nearest tier boundary:
/// `0.5 + min(distance, 4)/4 * 0.4`, rounded to two decimals.
pub fn confidence_for_score(score: i32, tier: Tier) -> f64 {
    let distance = match tier {
        Tier::High => score - HIGH_THRESHOLD,
        Tier::Medium => (score - MEDIUM_THRESHOLD).min(HIGH_THRESHOLD - 1 - score),
        Tier::Low => MEDIUM_THRESHOLD - 1 - score,
    }
    .max(0);
    let confidence = 0.5 + f64::from(distance.min(4)) / 4.0 * 0.4;
    (confidence * 100.0).round() / 100.0
}
