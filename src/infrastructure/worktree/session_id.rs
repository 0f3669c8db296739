//! Per-process session identity.
//!
//! Format `pid-<pid>-<startTimestampMillis>`. The id isolates concurrent
//! host instances sharing one repository; it appears in filesystem paths,
//! so it is validated on every use.

use std::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};

static PROCESS_SESSION_ID: Mutex<Option<String>> = Mutex::new(None);

/// Lazily generate and memoize this process's session id.
pub fn process_session_id() -> String {
    let mut guard = PROCESS_SESSION_ID
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard
        .get_or_insert_with(|| {
            let pid = std::process::id();
            let millis = chrono::Utc::now().timestamp_millis();
            format!("pid-{pid}-{millis}")
        })
        .clone()
}

/// Clear the memoized id so the next call regenerates it. Test-only.
#[doc(hidden)]
pub fn reset_process_session_id() {
    let mut guard = PROCESS_SESSION_ID
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = None;
}

/// Reject any session id that could influence path resolution: only
/// `[A-Za-z0-9_-]` is allowed, and `..` never is.
pub fn validate_session_id(id: &str) -> DomainResult<()> {
    if id.is_empty() {
        return Err(DomainError::InvalidSessionId("empty".to_string()));
    }
    if id.contains("..") {
        return Err(DomainError::InvalidSessionId(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DomainError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}
