//! Configuration model loaded by the figment-based loader.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmcConfig {
    pub swarm: SwarmConfig,
    pub compaction: CompactionConfig,
    pub routing: RoutingConfig,
    pub providers: ProvidersConfig,
    pub logging: LoggingConfig,
}

impl Default for OmcConfig {
    fn default() -> Self {
        Self {
            swarm: SwarmConfig::default(),
            compaction: CompactionConfig::default(),
            routing: RoutingConfig::default(),
            providers: ProvidersConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Lease duration after which an unrefreshed claim is eligible for sweep.
    pub lease_timeout_secs: u64,
    /// Interval between stale-claim sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            lease_timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Model context window in tokens.
    pub context_limit: u64,
    /// Warning notice above this usage ratio.
    pub warning_threshold: f64,
    /// Critical notice above this usage ratio.
    pub critical_threshold: f64,
    /// Minimum interval between notices per session.
    pub cooldown_ms: u64,
    /// Maximum notices per session.
    pub max_warnings: u32,
    /// Skip analysis when the previous one is newer than this.
    pub debounce_ms: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            context_limit: 200_000,
            warning_threshold: 0.85,
            critical_threshold: 0.95,
            cooldown_ms: 60_000,
            max_warnings: 3,
            debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub low_model: String,
    pub medium_model: String,
    pub high_model: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_model: "haiku".to_string(),
            medium_model: "sonnet".to_string(),
            high_model: "opus".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub codex: ProviderConfig,
    pub gemini: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OmcConfig::default();
        assert_eq!(config.swarm.lease_timeout_secs, 300);
        assert_eq!(config.swarm.sweep_interval_secs, 60);
        assert_eq!(config.compaction.context_limit, 200_000);
        assert!((config.compaction.warning_threshold - 0.85).abs() < f64::EPSILON);
        assert!((config.compaction.critical_threshold - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.compaction.max_warnings, 3);
        assert_eq!(config.routing.high_model, "opus");
        assert_eq!(config.providers.codex.timeout_secs, 120);
    }

    #[test]
    fn test_partial_yaml_merges_with_defaults() {
        let yaml = "swarm:\n  lease_timeout_secs: 60\n";
        let config: OmcConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.swarm.lease_timeout_secs, 60);
        assert_eq!(config.swarm.sweep_interval_secs, 60);
        assert_eq!(config.compaction.context_limit, 200_000);
    }
}
