//! Swarm session row and schema versioning.

use serde::{Deserialize, Serialize};

/// Single-row record describing the lifetime of one swarm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSession {
    pub session_id: String,
    /// Epoch milliseconds.
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub agent_count: i64,
    pub active: bool,
}

/// Recognized swarm database schema versions.
///
/// Version 2 adds the scheduling columns `priority`, `wave`, `owned_files`,
/// and `file_patterns` to the tasks table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V2;

    pub fn as_i64(self) -> i64 {
        match self {
            SchemaVersion::V1 => 1,
            SchemaVersion::V2 => 2,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(SchemaVersion::V1),
            2 => Some(SchemaVersion::V2),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version_round_trip() {
        assert_eq!(SchemaVersion::from_i64(1), Some(SchemaVersion::V1));
        assert_eq!(SchemaVersion::from_i64(2), Some(SchemaVersion::V2));
        assert_eq!(SchemaVersion::from_i64(3), None);
        assert_eq!(SchemaVersion::CURRENT.as_i64(), 2);
    }
}
