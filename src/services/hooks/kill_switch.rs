//! Global and per-hook kill switches.
//!
//! `DISABLE_OMC` short-circuits every hook; `OMC_SKIP_HOOKS` holds a
//! comma-separated, whitespace-tolerant list of hook names that are
//! individually suppressed. The global switch dominates the skip list.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::infrastructure::logging::env_flag;

static SKIP_CACHE: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Whether the global kill switch is on.
pub fn omc_disabled() -> bool {
    env_flag("DISABLE_OMC")
}

/// Whether `hook_name` appears in the (cached) `OMC_SKIP_HOOKS` list.
pub fn hook_skipped(hook_name: &str) -> bool {
    let mut cache = SKIP_CACHE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    cache
        .get_or_insert_with(parse_skip_list)
        .contains(hook_name)
}

fn parse_skip_list() -> HashSet<String> {
    std::env::var("OMC_SKIP_HOOKS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Drop the cached skip set so the next check re-reads the environment.
/// Test-only.
#[doc(hidden)]
pub fn reset_skip_cache() {
    *SKIP_CACHE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_list_parsing_tolerates_whitespace() {
        temp_env::with_var(
            "OMC_SKIP_HOOKS",
            Some("keyword-detector,  pre-tool-use , ralph"),
            || {
                reset_skip_cache();
                assert!(hook_skipped("keyword-detector"));
                assert!(hook_skipped("pre-tool-use"));
                assert!(hook_skipped("ralph"));
                assert!(!hook_skipped("post-tool-use"));
            },
        );
        reset_skip_cache();
    }

    #[test]
    fn test_empty_skip_list() {
        temp_env::with_var("OMC_SKIP_HOOKS", None::<&str>, || {
            reset_skip_cache();
            assert!(!hook_skipped("keyword-detector"));
        });
        reset_skip_cache();
    }

    #[test]
    fn test_skip_set_is_cached() {
        temp_env::with_var("OMC_SKIP_HOOKS", Some("ralph"), || {
            reset_skip_cache();
            assert!(hook_skipped("ralph"));
            temp_env::with_var("OMC_SKIP_HOOKS", None::<&str>, || {
                // Env is gone, but the cached set still answers until reset.
                assert!(hook_skipped("ralph"));
                reset_skip_cache();
                assert!(!hook_skipped("ralph"));
            });
        });
        reset_skip_cache();
    }

    #[test]
    fn test_global_disable_flag() {
        temp_env::with_var("DISABLE_OMC", Some("1"), || {
            assert!(omc_disabled());
        });
        temp_env::with_var("DISABLE_OMC", Some("true"), || {
            assert!(omc_disabled());
        });
        temp_env::with_var("DISABLE_OMC", Some("0"), || {
            assert!(!omc_disabled());
        });
    }
}
