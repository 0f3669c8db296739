//! Swarm task model: the unit of work delivered to exactly one agent.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a swarm task.
///
/// Legal transitions: `Pending -> Claimed -> {Done, Failed}`, and a failed
/// task may be re-claimed via retry. Direct `Pending -> Done` is forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "claimed" => Some(TaskStatus::Claimed),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// A single task row in the swarm pool.
///
/// `claimed_at`, `completed_at`, and `last_heartbeat` timestamps are epoch
/// milliseconds. `owned_files` are concrete relative paths; `file_patterns`
/// are bounded glob patterns. Both feed file-scope affinity claiming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmTask {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Smaller value = higher priority. Default 0.
    pub priority: i64,
    /// Scheduling generation. Default 1.
    pub wave: i64,
    pub owned_files: Option<Vec<String>>,
    pub file_patterns: Option<Vec<String>>,
    /// Present only on success.
    pub result: Option<String>,
    /// Present only on failure.
    pub error: Option<String>,
}

impl SwarmTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            priority: 0,
            wave: 1,
            owned_files: None,
            file_patterns: None,
            result: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_wave(mut self, wave: i64) -> Self {
        self.wave = wave;
        self
    }

    pub fn with_owned_files(mut self, files: Vec<String>) -> Self {
        self.owned_files = Some(files);
        self
    }

    pub fn with_file_patterns(mut self, patterns: Vec<String>) -> Self {
        self.file_patterns = Some(patterns);
        self
    }
}

/// Description + optional scheduling metadata for batch task insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub wave: Option<i64>,
    #[serde(default)]
    pub owned_files: Option<Vec<String>>,
    #[serde(default)]
    pub file_patterns: Option<Vec<String>>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

/// Outcome of an atomic claim attempt.
///
/// `Raced` means the compare-and-set update affected zero rows because a
/// concurrent claimer won; the caller may retry at its own discretion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed { task_id: String, description: String },
    NoneAvailable,
    Raced,
}

impl ClaimOutcome {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ClaimOutcome::Claimed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// Liveness record for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub agent_id: String,
    /// Epoch milliseconds of the most recent heartbeat.
    pub last_heartbeat: i64,
    pub current_task_id: Option<String>,
}

/// Aggregate counts used by the summary artifact and status surfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmStats {
    pub pending: u64,
    pub claimed: u64,
    pub done: u64,
    pub failed: u64,
    /// Per-agent claim counts, sorted by agent id.
    pub claims_by_agent: Vec<(String, u64)>,
    pub oldest_pending: Option<String>,
    pub most_recent_failure: Option<(String, String)>,
}

impl SwarmStats {
    pub fn total(&self) -> u64 {
        self.pending + self.claimed + self.done + self.failed
    }
}

/// Parse the numeric suffix of a `task-<n>` id, used when assigning ids for
/// newly added batches (ids continue from the current maximum).
pub fn task_id_number(id: &str) -> Option<u64> {
    id.rsplit('-').next().and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Claimed,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("running"), None);
    }

    #[test]
    fn test_new_task_defaults() {
        let task = SwarmTask::new("task-1", "Do the thing");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 0);
        assert_eq!(task.wave, 1);
        assert!(task.claimed_by.is_none());
        assert!(task.result.is_none());
    }

    #[test]
    fn test_task_id_number() {
        assert_eq!(task_id_number("task-7"), Some(7));
        assert_eq!(task_id_number("task-120"), Some(120));
        assert_eq!(task_id_number("not-a-number-x"), None);
    }
}
