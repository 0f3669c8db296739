//! Tracing initialization and env-gated debug logs.

pub mod debug_log;

pub use debug_log::DebugLog;

use tracing_subscriber::EnvFilter;

use crate::domain::models::LoggingConfig;

/// Initialize the global tracing subscriber from config. Diagnostics go to
/// stderr so hook stdout stays pure JSON. Safe to call more than once; only
/// the first call installs a subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env("OMC_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Whether `OMC_DEBUG` diagnostics are enabled.
pub fn debug_enabled() -> bool {
    env_flag("OMC_DEBUG")
}

/// Truthy check for `1`/`true` flag variables.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag_values() {
        temp_env::with_var("OMC_TEST_FLAG", Some("1"), || {
            assert!(env_flag("OMC_TEST_FLAG"));
        });
        temp_env::with_var("OMC_TEST_FLAG", Some("true"), || {
            assert!(env_flag("OMC_TEST_FLAG"));
        });
        temp_env::with_var("OMC_TEST_FLAG", Some("TRUE"), || {
            assert!(env_flag("OMC_TEST_FLAG"));
        });
        temp_env::with_var("OMC_TEST_FLAG", Some("0"), || {
            assert!(!env_flag("OMC_TEST_FLAG"));
        });
        temp_env::with_var("OMC_TEST_FLAG", None::<&str>, || {
            assert!(!env_flag("OMC_TEST_FLAG"));
        });
    }
}
