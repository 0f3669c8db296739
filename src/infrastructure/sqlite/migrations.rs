//! Swarm store schema management.
//!
//! The schema version lives in the `meta` table. Version 1 is the base
//! schema; version 2 adds the scheduling columns `priority`, `wave`,
//! `owned_files`, and `file_patterns`. The v1 -> v2 migration checks each
//! column's presence before `ALTER TABLE`, so re-running it is a no-op and
//! pre-existing rows are preserved.

use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::domain::models::SchemaVersion;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration to v{version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to read schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
    #[error("Unrecognized schema version: {0}")]
    UnknownVersion(i64),
}

/// Columns added by the v2 migration, with their ALTER definitions.
const V2_COLUMNS: &[(&str, &str)] = &[
    ("priority", "INTEGER NOT NULL DEFAULT 0"),
    ("wave", "INTEGER NOT NULL DEFAULT 1"),
    ("owned_files", "TEXT"),
    ("file_patterns", "TEXT"),
];

pub struct SwarmMigrator {
    pool: SqlitePool,
}

impl SwarmMigrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create missing tables and bring the schema to the current version.
    /// Idempotent: applying this N times yields the same schema and keeps
    /// all rows.
    pub async fn ensure_schema(&self) -> Result<SchemaVersion, MigrationError> {
        sqlx::raw_sql(include_str!("../../../migrations/001_initial_schema.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError { version: 1, source: e })?;

        let version = self.current_version().await?;
        match version {
            SchemaVersion::V1 => {
                self.migrate_v1_to_v2().await?;
                Ok(SchemaVersion::V2)
            }
            SchemaVersion::V2 => Ok(SchemaVersion::V2),
        }
    }

    /// Read the stored version; a fresh database gets a version row of 1.
    pub async fn current_version(&self) -> Result<SchemaVersion, MigrationError> {
        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('version', '1')")
            .execute(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;

        let row = sqlx::query("SELECT value FROM meta WHERE key = 'version'")
            .fetch_one(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        let raw: String = row.get("value");
        let numeric: i64 = raw.parse().map_err(|_| MigrationError::UnknownVersion(-1))?;
        SchemaVersion::from_i64(numeric).ok_or(MigrationError::UnknownVersion(numeric))
    }

    async fn migrate_v1_to_v2(&self) -> Result<(), MigrationError> {
        let existing = self.task_columns().await?;
        for (name, definition) in V2_COLUMNS {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            let sql = format!("ALTER TABLE tasks ADD COLUMN {name} {definition}");
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::ExecutionError { version: 2, source: e })?;
        }

        sqlx::query("UPDATE meta SET value = '2' WHERE key = 'version'")
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError { version: 2, source: e })?;
        Ok(())
    }

    async fn task_columns(&self) -> Result<Vec<String>, MigrationError> {
        let rows = sqlx::query("PRAGMA table_info(tasks)")
            .fetch_all(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
    }
}
