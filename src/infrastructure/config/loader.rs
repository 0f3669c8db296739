//! Hierarchical configuration loading.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::OmcConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid lease timeout: {0}. Must be positive")]
    InvalidLeaseTimeout(u64),

    #[error("Invalid sweep interval: {0}. Must be positive")]
    InvalidSweepInterval(u64),

    #[error("Invalid threshold {name}: {value}. Must be in (0, 1]")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Warning threshold ({warning}) must be below critical threshold ({critical})")]
    ThresholdOrder { warning: f64, critical: f64 },

    #[error("Invalid context limit: {0}. Must be positive")]
    InvalidContextLimit(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a worktree.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.omc/config.yaml` (project config)
    /// 3. `.omc/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`OMC_*` prefix)
    pub fn load(worktree_root: &Path) -> Result<OmcConfig> {
        let omc = worktree_root.join(".omc");
        let config: OmcConfig = Figment::new()
            .merge(Serialized::defaults(OmcConfig::default()))
            .merge(Yaml::file(omc.join("config.yaml")))
            .merge(Yaml::file(omc.join("local.yaml")))
            .merge(Env::prefixed("OMC_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<OmcConfig> {
        let config: OmcConfig = Figment::new()
            .merge(Serialized::defaults(OmcConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &OmcConfig) -> Result<(), ConfigError> {
        if config.swarm.lease_timeout_secs == 0 {
            return Err(ConfigError::InvalidLeaseTimeout(config.swarm.lease_timeout_secs));
        }
        if config.swarm.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval(config.swarm.sweep_interval_secs));
        }

        if config.compaction.context_limit == 0 {
            return Err(ConfigError::InvalidContextLimit(config.compaction.context_limit));
        }
        for (name, value) in [
            ("warning_threshold", config.compaction.warning_threshold),
            ("critical_threshold", config.compaction.critical_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if config.compaction.warning_threshold >= config.compaction.critical_threshold {
            return Err(ConfigError::ThresholdOrder {
                warning: config.compaction.warning_threshold,
                critical: config.compaction.critical_threshold,
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

/// Whether the system is hosted as a plugin. Plugin hosting forbids
/// rewriting host-global settings.
pub fn is_plugin_hosted() -> bool {
    std::env::var("CLAUDE_PLUGIN_ROOT").is_ok_and(|v| !v.is_empty())
}
