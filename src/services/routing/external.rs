//! External-model resolution with strict precedence and a deduplicated
//! fallback chain.

use std::collections::HashMap;

use crate::domain::models::{ExternalResolution, ModelPreference, Provider};

/// Hardcoded last-resort defaults per provider.
const CODEX_HARDCODED_DEFAULT: &str = "gpt-5-codex";
const GEMINI_HARDCODED_DEFAULT: &str = "gemini-2.5-pro";

/// Per-provider environment fallbacks.
const CODEX_MODEL_ENV: &str = "OMC_CODEX_DEFAULT_MODEL";
const GEMINI_MODEL_ENV: &str = "OMC_GEMINI_DEFAULT_MODEL";

/// Default chains tried after the resolved model.
fn provider_default_chain(provider: Provider) -> Vec<String> {
    match provider {
        Provider::Codex => vec![
            CODEX_HARDCODED_DEFAULT.to_string(),
            "gpt-5".to_string(),
            "o4-mini".to_string(),
        ],
        Provider::Gemini => vec![
            GEMINI_HARDCODED_DEFAULT.to_string(),
            "gemini-2.5-flash".to_string(),
        ],
    }
}

/// Configured preferences consulted by the precedence ladder.
#[derive(Debug, Clone, Default)]
pub struct ExternalRoutingConfig {
    pub primary_model: Option<String>,
    pub secondary_model: Option<String>,
    /// Keyed by task type, e.g. `research`.
    pub task_preferences: HashMap<String, ModelPreference>,
    /// Keyed by agent role, e.g. `navigator`.
    pub role_preferences: HashMap<String, ModelPreference>,
}

/// One resolution request.
#[derive(Debug, Clone, Default)]
pub struct ExternalRequest {
    pub explicit_model: Option<String>,
    pub explicit_provider: Option<Provider>,
    pub agent_role: Option<String>,
    pub task_type: Option<String>,
}

/// Resolve the target model under the precedence ladder (highest first):
/// explicit model, provider-matched role preference, task preference, role
/// preference, config defaults, environment variables, hardcoded defaults.
pub fn resolve_external_model(
    config: &ExternalRoutingConfig,
    request: &ExternalRequest,
) -> ExternalResolution {
    // 1. Explicit model; provider inferred from the name.
    if let Some(model) = &request.explicit_model {
        let provider = Provider::infer_from_model(model);
        return resolution(provider, model.clone(), "explicit-model");
    }

    // 2. Explicit provider with a matching role preference.
    if let (Some(provider), Some(role)) = (request.explicit_provider, &request.agent_role) {
        if let Some(pref) = config.role_preferences.get(role) {
            if pref.provider == provider {
                return resolution(provider, pref.model.clone(), "provider-role-preference");
            }
        }
    }

    // 3. Task-type preference.
    if let Some(task_type) = &request.task_type {
        if let Some(pref) = config.task_preferences.get(task_type) {
            return resolution(pref.provider, pref.model.clone(), "task-preference");
        }
    }

    // 4. Role preference regardless of explicit provider.
    if let Some(role) = &request.agent_role {
        if let Some(pref) = config.role_preferences.get(role) {
            return resolution(pref.provider, pref.model.clone(), "role-preference");
        }
    }

    // 5. Config defaults.
    if let Some(model) = config.primary_model.as_ref().or(config.secondary_model.as_ref()) {
        let provider = request
            .explicit_provider
            .unwrap_or_else(|| Provider::infer_from_model(model));
        return resolution(provider, model.clone(), "config-default");
    }

    // 6. Environment variable for the target provider.
    let provider = request.explicit_provider.unwrap_or(Provider::Codex);
    let env_name = match provider {
        Provider::Codex => CODEX_MODEL_ENV,
        Provider::Gemini => GEMINI_MODEL_ENV,
    };
    if let Ok(model) = std::env::var(env_name) {
        if !model.trim().is_empty() {
            return resolution(provider, model.trim().to_string(), "env-default");
        }
    }

    // 7. Hardcoded defaults.
    let model = match provider {
        Provider::Codex => CODEX_HARDCODED_DEFAULT,
        Provider::Gemini => GEMINI_HARDCODED_DEFAULT,
    };
    resolution(provider, model.to_string(), "hardcoded-default")
}

/// Build the final resolution: resolved model first, then the provider's
/// default chain, deduplicated preserving first occurrence.
fn resolution(provider: Provider, model: String, source: &str) -> ExternalResolution {
    let mut fallback_chain = vec![model.clone()];
    for candidate in provider_default_chain(provider) {
        if !fallback_chain.contains(&candidate) {
            fallback_chain.push(candidate);
        }
    }
    ExternalResolution {
        provider,
        model,
        fallback_chain,
        source: source.to_string(),
    }
}

/// Per-provider timeout: `OMC_CODEX_TIMEOUT` / `OMC_GEMINI_TIMEOUT` in
/// seconds, over the configured default.
pub fn provider_timeout_secs(provider: Provider, configured_default: u64) -> u64 {
    let env_name = match provider {
        Provider::Codex => "OMC_CODEX_TIMEOUT",
        Provider::Gemini => "OMC_GEMINI_TIMEOUT",
    };
    std::env::var(env_name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(configured_default)
}
