//! Per-session retry accounting with TTL eviction.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::models::ErrorKind;

/// Retry policy for structural recovery.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum recovery attempts per session per error category.
    pub max_attempts: u32,
    /// Session state older than this is evicted on next access.
    pub state_ttl: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            state_ttl: Duration::from_secs(300),
        }
    }
}

/// Policy for truncation-based recovery of oversized tool outputs.
#[derive(Debug, Clone)]
pub struct TruncateConfig {
    pub max_truncate_attempts: u32,
    /// Outputs smaller than this are never truncated.
    pub min_output_size: usize,
    /// Target post-truncation size as a ratio of the original.
    pub target_ratio: f64,
}

impl Default for TruncateConfig {
    fn default() -> Self {
        Self {
            max_truncate_attempts: 20,
            min_output_size: 500,
            target_ratio: 0.5,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    attempts_by_kind: HashMap<ErrorKind, u32>,
    truncate_attempts: u32,
    last_attempt_millis: i64,
    last_error_millis: i64,
    error_count: u32,
}

/// Outcome of asking the ledger for permission to attempt a recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPermit {
    /// Attempt number (1-based).
    Allowed(u32),
    Exhausted,
}

/// In-memory, TTL-bound retry ledger. One instance is shared by all
/// recoveries running in a process; sessions are independent.
pub struct RetryLedger {
    retry: RetryConfig,
    truncate: TruncateConfig,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl RetryLedger {
    pub fn new(retry: RetryConfig, truncate: TruncateConfig) -> Self {
        Self {
            retry,
            truncate,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default(), TruncateConfig::default())
    }

    pub fn truncate_config(&self) -> &TruncateConfig {
        &self.truncate
    }

    /// Ask permission for one recovery attempt. Counts the attempt when
    /// allowed.
    pub fn begin_attempt(&self, session_id: &str, kind: ErrorKind) -> AttemptPermit {
        let now = chrono::Utc::now().timestamp_millis();
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.evict_stale(&mut sessions, now);

        let state = sessions.entry(session_id.to_string()).or_default();
        let attempts = state.attempts_by_kind.entry(kind).or_insert(0);
        if *attempts >= self.retry.max_attempts {
            return AttemptPermit::Exhausted;
        }
        *attempts += 1;
        state.last_attempt_millis = now;
        state.last_error_millis = now;
        state.error_count += 1;
        AttemptPermit::Allowed(*attempts)
    }

    /// Ask permission for one truncation attempt (independent counter).
    pub fn begin_truncate(&self, session_id: &str) -> AttemptPermit {
        let now = chrono::Utc::now().timestamp_millis();
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.evict_stale(&mut sessions, now);

        let state = sessions.entry(session_id.to_string()).or_default();
        if state.truncate_attempts >= self.truncate.max_truncate_attempts {
            return AttemptPermit::Exhausted;
        }
        state.truncate_attempts += 1;
        state.last_attempt_millis = now;
        AttemptPermit::Allowed(state.truncate_attempts)
    }

    /// Forget a session entirely, e.g. after a successful host turn.
    pub fn reset_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);
    }

    /// Test-only: clear all state.
    #[doc(hidden)]
    pub fn reset_all(&self) {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    fn evict_stale(&self, sessions: &mut HashMap<String, SessionState>, now: i64) {
        let ttl = self.retry.state_ttl.as_millis() as i64;
        sessions.retain(|_, state| now - state.last_attempt_millis <= ttl);
    }
}
