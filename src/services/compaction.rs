//! Preemptive compaction: warn before the host exceeds the context window.
//!
//! A per-session monotonic accumulator sums estimated tokens of large tool
//! outputs. Notices fire against warning/critical usage ratios, subject to
//! a per-session cooldown, a warning cap, and a rapid-fire debounce that
//! defeats simultaneous sub-agent completion storms.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::domain::models::CompactionConfig;
use crate::infrastructure::logging::DebugLog;

/// Approximate characters per token (conservative heuristic).
const CHARS_PER_TOKEN: u64 = 4;

/// Session entries idle longer than this are pruned.
const STALE_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Interval of the stale-entry pruning timer.
const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Tool families whose outputs count toward the accumulator.
const TRACKED_TOOLS: &[&str] = &[
    "read",
    "notebookread",
    "grep",
    "glob",
    "bash",
    "shell",
    "webfetch",
    "web-fetch",
    "web_fetch",
    "task",
];

/// Estimate tokens with the 4 chars/token heuristic.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(CHARS_PER_TOKEN)
}

fn is_tracked_tool(tool_name: &str) -> bool {
    let normalized = tool_name.to_lowercase();
    TRACKED_TOOLS.contains(&normalized.as_str())
}

/// A notice for the host to surface to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum CompactionNotice {
    Warning { estimated_tokens: u64, usage_ratio: f64 },
    Critical { estimated_tokens: u64, usage_ratio: f64 },
}

impl CompactionNotice {
    pub fn message(&self) -> String {
        match self {
            CompactionNotice::Warning { estimated_tokens, usage_ratio } => format!(
                "Context usage is approaching the window limit (~{estimated_tokens} tokens, \
                 {:.0}% of the window). Consider compacting soon.",
                usage_ratio * 100.0
            ),
            CompactionNotice::Critical { estimated_tokens, usage_ratio } => format!(
                "Context usage is critical (~{estimated_tokens} tokens, {:.0}% of the \
                 window). Compact now to avoid a hard context-window failure.",
                usage_ratio * 100.0
            ),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    estimated_tokens: u64,
    last_warning_millis: i64,
    warning_count: u32,
    has_warned: bool,
}

struct Inner {
    config: CompactionConfig,
    sessions: Mutex<HashMap<String, SessionState>>,
    /// Last-analysis timestamps for the rapid-fire debounce.
    last_analysis: Mutex<HashMap<String, i64>>,
    debug_log: DebugLog,
}

/// Preemptive compaction monitor. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CompactionMonitor {
    inner: Arc<Inner>,
}

impl CompactionMonitor {
    pub fn new(config: CompactionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: Mutex::new(HashMap::new()),
                last_analysis: Mutex::new(HashMap::new()),
                debug_log: DebugLog::compaction(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CompactionConfig::default())
    }

    /// Feed one tool output into the accumulator and analyze usage.
    pub fn observe_tool_output(
        &self,
        session_id: &str,
        tool_name: &str,
        output: &str,
    ) -> Option<CompactionNotice> {
        self.observe_at(
            session_id,
            tool_name,
            output,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    /// Clock-injected variant backing `observe_tool_output`.
    pub(crate) fn observe_at(
        &self,
        session_id: &str,
        tool_name: &str,
        output: &str,
        now: i64,
    ) -> Option<CompactionNotice> {
        if !is_tracked_tool(tool_name) {
            return None;
        }

        let tokens = estimate_tokens(output);
        let accumulated = {
            let mut sessions = self.lock_sessions();
            let state = sessions.entry(session_id.to_string()).or_insert(SessionState {
                estimated_tokens: 0,
                last_warning_millis: now,
                warning_count: 0,
                has_warned: false,
            });
            state.estimated_tokens += tokens;
            state.estimated_tokens
        };

        // Rapid-fire debounce: accumulate but skip analysis when the last
        // analysis for this session is too fresh.
        {
            let mut last_analysis = self.lock_analysis();
            if let Some(last) = last_analysis.get(session_id) {
                if now - last < self.inner.config.debounce_ms as i64 {
                    return None;
                }
            }
            last_analysis.insert(session_id.to_string(), now);
        }

        self.analyze(session_id, accumulated, now)
    }

    fn analyze(&self, session_id: &str, accumulated: u64, now: i64) -> Option<CompactionNotice> {
        let config = &self.inner.config;
        let usage_ratio = accumulated as f64 / config.context_limit as f64;

        let notice = if usage_ratio >= config.critical_threshold {
            CompactionNotice::Critical {
                estimated_tokens: accumulated,
                usage_ratio,
            }
        } else if usage_ratio >= config.warning_threshold {
            CompactionNotice::Warning {
                estimated_tokens: accumulated,
                usage_ratio,
            }
        } else {
            return None;
        };

        let mut sessions = self.lock_sessions();
        let state = sessions.get_mut(session_id)?;

        if state.warning_count >= config.max_warnings {
            return None;
        }
        if state.has_warned && now - state.last_warning_millis < config.cooldown_ms as i64 {
            return None;
        }

        state.warning_count += 1;
        state.last_warning_millis = now;
        state.has_warned = true;
        self.inner.debug_log.line(&format!(
            "session {session_id}: notice #{}, ~{accumulated} tokens ({:.2} ratio)",
            state.warning_count, usage_ratio
        ));
        Some(notice)
    }

    /// Host `stop` event: reset the warning budget and the debounce entry,
    /// but keep the accumulator; the next turn may continue the same
    /// logical conversation.
    pub fn on_stop(&self, session_id: &str) {
        if let Some(state) = self.lock_sessions().get_mut(session_id) {
            state.warning_count = 0;
        }
        self.lock_analysis().remove(session_id);
    }

    /// Remove session entries that have been quiet past the TTL.
    pub fn prune_stale(&self) {
        self.prune_stale_at(chrono::Utc::now().timestamp_millis());
    }

    pub(crate) fn prune_stale_at(&self, now: i64) {
        let ttl = STALE_SESSION_TTL.as_millis() as i64;
        let mut sessions = self.lock_sessions();
        let mut analysis = self.lock_analysis();
        sessions.retain(|session_id, state| {
            let keep = now - state.last_warning_millis <= ttl;
            if !keep {
                analysis.remove(session_id);
            }
            keep
        });
    }

    /// Spawn the 5-minute pruning timer. The returned handle owns the
    /// timer; abort it to stop pruning.
    pub fn spawn_pruner(&self) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                monitor.prune_stale();
            }
        })
    }

    /// Current accumulator value; absent sessions read as zero.
    pub fn accumulated_tokens(&self, session_id: &str) -> u64 {
        self.lock_sessions()
            .get(session_id)
            .map_or(0, |s| s.estimated_tokens)
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionState>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_analysis(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.inner
            .last_analysis
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
