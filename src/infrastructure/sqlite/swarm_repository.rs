//! SQLite repository for the swarm task pool.
//!
//! Every mutation runs inside a transaction. Claims use a compare-and-set
//! (`UPDATE ... WHERE status = 'pending'`); an affected-row count of zero
//! surfaces as a race rather than serializing behind a row lock, so
//! contending agents observe the loss and can retry at their discretion.

use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ClaimOutcome, Heartbeat, SwarmSession, SwarmStats, SwarmTask, TaskStatus,
};

#[derive(Debug, Clone)]
pub struct SwarmRepository {
    pool: SqlitePool,
}

impl SwarmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All-or-nothing batch insert.
    pub async fn insert_tasks(&self, tasks: &[SwarmTask]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            let owned_files = task
                .owned_files
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let file_patterns = task
                .file_patterns
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                r#"INSERT INTO tasks (id, description, status, claimed_by, claimed_at,
                   completed_at, priority, wave, owned_files, file_patterns, result, error)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&task.id)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(&task.claimed_by)
            .bind(task.claimed_at)
            .bind(task.completed_at)
            .bind(task.priority)
            .bind(task.wave)
            .bind(owned_files)
            .bind(file_patterns)
            .bind(&task.result)
            .bind(&task.error)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove every task, heartbeat, and session row. Used when a new swarm
    /// replaces a finished one.
    pub async fn clear_all(&self) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tasks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM heartbeats").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM swarm_session").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_task(&self, id: &str) -> DomainResult<Option<SwarmTask>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_tasks(&self) -> DomainResult<Vec<SwarmTask>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks ORDER BY priority ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Pending tasks in claim order.
    pub async fn list_pending(&self) -> DomainResult<Vec<SwarmTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'pending' ORDER BY priority ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Largest numeric suffix among existing `task-<n>` ids.
    pub async fn max_task_number(&self) -> DomainResult<u64> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM tasks")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|(id,)| crate::domain::models::task::task_id_number(id))
            .max()
            .unwrap_or(0))
    }

    /// Atomically claim the smallest `(priority, id)` pending task.
    ///
    /// The transaction takes the write lock upfront (`BEGIN IMMEDIATE`) so
    /// contending claimers serialize at the store instead of failing with
    /// snapshot-invalidation errors mid-transaction. The conditional
    /// `UPDATE ... WHERE status = 'pending'` compare-and-set stays in place;
    /// zero affected rows surfaces as `Raced`.
    pub async fn claim_next(&self, agent_id: &str, now: i64) -> DomainResult<ClaimOutcome> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = async {
            let candidate: Option<(String, String)> = sqlx::query_as(
                r#"SELECT id, description FROM tasks WHERE status = 'pending'
                   ORDER BY priority ASC, id ASC LIMIT 1"#,
            )
            .fetch_optional(&mut *conn)
            .await?;

            let Some((task_id, description)) = candidate else {
                return Ok(ClaimOutcome::NoneAvailable);
            };

            let updated = sqlx::query(
                r#"UPDATE tasks SET status = 'claimed', claimed_by = ?, claimed_at = ?
                   WHERE id = ? AND status = 'pending'"#,
            )
            .bind(agent_id)
            .bind(now)
            .bind(&task_id)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                return Ok(ClaimOutcome::Raced);
            }

            upsert_heartbeat_on(&mut conn, agent_id, now, Some(&task_id)).await?;
            Ok(ClaimOutcome::Claimed {
                task_id,
                description,
            })
        }
        .await;

        finish_immediate(&mut conn, &outcome).await?;
        outcome
    }

    /// Compare-and-set claim of one specific pending task. Used by the
    /// file-affinity path after pattern matching picked a candidate outside
    /// the transaction, so losing the race here is a real possibility.
    pub async fn claim_specific(
        &self,
        agent_id: &str,
        task_id: &str,
        now: i64,
    ) -> DomainResult<ClaimOutcome> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = async {
            let description: Option<(String,)> =
                sqlx::query_as("SELECT description FROM tasks WHERE id = ?")
                    .bind(task_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let Some((description,)) = description else {
                return Err(DomainError::TaskNotFound(task_id.to_string()));
            };

            let updated = sqlx::query(
                r#"UPDATE tasks SET status = 'claimed', claimed_by = ?, claimed_at = ?
                   WHERE id = ? AND status = 'pending'"#,
            )
            .bind(agent_id)
            .bind(now)
            .bind(task_id)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                return Ok(ClaimOutcome::Raced);
            }

            upsert_heartbeat_on(&mut conn, agent_id, now, Some(task_id)).await?;
            Ok(ClaimOutcome::Claimed {
                task_id: task_id.to_string(),
                description,
            })
        }
        .await;

        finish_immediate(&mut conn, &outcome).await?;
        outcome
    }

    /// Move a claimed task to done. Returns `false` when the task is not
    /// owned by `agent_id` (nothing is mutated in that case). The
    /// transaction's boolean outcome is deliberately distinct from the
    /// caller-supplied result string.
    pub async fn complete(
        &self,
        agent_id: &str,
        task_id: &str,
        result: Option<&str>,
        now: i64,
    ) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"UPDATE tasks SET status = 'done', completed_at = ?, result = ?
               WHERE id = ? AND status = 'claimed' AND claimed_by = ?"#,
        )
        .bind(now)
        .bind(result)
        .bind(task_id)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        clear_heartbeat_task(&mut *tx, agent_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Move a claimed task to failed with error text.
    pub async fn fail(
        &self,
        agent_id: &str,
        task_id: &str,
        error: &str,
        now: i64,
    ) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"UPDATE tasks SET status = 'failed', completed_at = ?, error = ?
               WHERE id = ? AND status = 'claimed' AND claimed_by = ?"#,
        )
        .bind(now)
        .bind(error)
        .bind(task_id)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        clear_heartbeat_task(&mut *tx, agent_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Return a claimed task to the pending pool.
    pub async fn release(&self, agent_id: &str, task_id: &str) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"UPDATE tasks SET status = 'pending', claimed_by = NULL, claimed_at = NULL
               WHERE id = ? AND status = 'claimed' AND claimed_by = ?"#,
        )
        .bind(task_id)
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        clear_heartbeat_task(&mut *tx, agent_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Re-claim a failed task (same or different agent).
    pub async fn retry(&self, agent_id: &str, task_id: &str, now: i64) -> DomainResult<SwarmTask> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"UPDATE tasks SET status = 'claimed', claimed_by = ?, claimed_at = ?,
               completed_at = NULL, error = NULL
               WHERE id = ? AND status = 'failed'"#,
        )
        .bind(agent_id)
        .bind(now)
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Distinguish a missing task from one in the wrong state.
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = ?")
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => DomainError::TaskNotFailed(task_id.to_string()),
                None => DomainError::TaskNotFound(task_id.to_string()),
            });
        }

        upsert_heartbeat_on(&mut *tx, agent_id, now, Some(task_id)).await?;
        tx.commit().await?;

        self.get_task(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    /// Refresh an agent's liveness and record which task it is holding.
    pub async fn heartbeat(&self, agent_id: &str, now: i64) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = async {
            let current: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM tasks WHERE claimed_by = ? AND status = 'claimed' LIMIT 1",
            )
            .bind(agent_id)
            .fetch_optional(&mut *conn)
            .await?;

            upsert_heartbeat_on(
                &mut conn,
                agent_id,
                now,
                current.as_ref().map(|(id,)| id.as_str()),
            )
            .await
        }
        .await;

        finish_immediate(&mut conn, &outcome).await?;
        outcome
    }

    pub async fn get_heartbeat(&self, agent_id: &str) -> DomainResult<Option<Heartbeat>> {
        let row = sqlx::query(
            "SELECT agent_id, last_heartbeat, current_task_id FROM heartbeats WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Heartbeat {
            agent_id: r.get("agent_id"),
            last_heartbeat: r.get("last_heartbeat"),
            current_task_id: r.get("current_task_id"),
        }))
    }

    /// Release every expired claim whose owner also has no heartbeat newer
    /// than the cutoff, then delete stale heartbeat rows. The double check
    /// keeps a transiently slow but alive agent from losing its task. One
    /// transaction covers both steps.
    pub async fn cleanup_stale_claims(&self, lease_timeout_ms: i64, now: i64) -> DomainResult<u64> {
        let cutoff = now - lease_timeout_ms;
        let mut tx = self.pool.begin().await?;

        let released = sqlx::query(
            r#"UPDATE tasks SET status = 'pending', claimed_by = NULL, claimed_at = NULL
               WHERE status = 'claimed'
                 AND claimed_at < ?
                 AND (claimed_by IS NULL OR claimed_by NOT IN (
                     SELECT agent_id FROM heartbeats WHERE last_heartbeat >= ?
                 ))"#,
        )
        .bind(cutoff)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM heartbeats WHERE last_heartbeat < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(released)
    }

    pub async fn upsert_session(&self, session: &SwarmSession) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO swarm_session (session_id, started_at, completed_at, agent_count, active)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(session_id) DO UPDATE SET
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at,
                 agent_count = excluded.agent_count,
                 active = excluded.active"#,
        )
        .bind(&session.session_id)
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(session.agent_count)
        .bind(i64::from(session.active))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self) -> DomainResult<Option<SwarmSession>> {
        let row = sqlx::query("SELECT * FROM swarm_session LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| SwarmSession {
            session_id: r.get("session_id"),
            started_at: r.get("started_at"),
            completed_at: r.get("completed_at"),
            agent_count: r.get("agent_count"),
            active: r.get::<i64, _>("active") != 0,
        }))
    }

    pub async fn mark_session_inactive(&self, now: i64) -> DomainResult<()> {
        sqlx::query("UPDATE swarm_session SET active = 0, completed_at = ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Aggregate counts for the summary artifact and status surfaces.
    pub async fn stats(&self) -> DomainResult<SwarmStats> {
        let mut stats = SwarmStats::default();

        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in counts {
            match TaskStatus::from_str(&status) {
                Some(TaskStatus::Pending) => stats.pending = count as u64,
                Some(TaskStatus::Claimed) => stats.claimed = count as u64,
                Some(TaskStatus::Done) => stats.done = count as u64,
                Some(TaskStatus::Failed) => stats.failed = count as u64,
                None => {}
            }
        }

        let claims: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT claimed_by, COUNT(*) FROM tasks
               WHERE claimed_by IS NOT NULL AND status = 'claimed'
               GROUP BY claimed_by ORDER BY claimed_by"#,
        )
        .fetch_all(&self.pool)
        .await?;
        stats.claims_by_agent = claims
            .into_iter()
            .map(|(agent, count)| (agent, count as u64))
            .collect();

        let oldest: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM tasks WHERE status = 'pending' ORDER BY priority ASC, id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        stats.oldest_pending = oldest.map(|(id,)| id);

        let failure: Option<(String, Option<String>)> = sqlx::query_as(
            r#"SELECT id, error FROM tasks WHERE status = 'failed'
               ORDER BY completed_at DESC LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        stats.most_recent_failure =
            failure.map(|(id, error)| (id, error.unwrap_or_default()));

        Ok(stats)
    }
}

async fn upsert_heartbeat_on(
    conn: &mut sqlx::SqliteConnection,
    agent_id: &str,
    now: i64,
    current_task_id: Option<&str>,
) -> DomainResult<()> {
    sqlx::query(
        r#"INSERT INTO heartbeats (agent_id, last_heartbeat, current_task_id)
           VALUES (?, ?, ?)
           ON CONFLICT(agent_id) DO UPDATE SET
             last_heartbeat = excluded.last_heartbeat,
             current_task_id = excluded.current_task_id"#,
    )
    .bind(agent_id)
    .bind(now)
    .bind(current_task_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn clear_heartbeat_task(
    conn: &mut sqlx::SqliteConnection,
    agent_id: &str,
) -> DomainResult<()> {
    sqlx::query("UPDATE heartbeats SET current_task_id = NULL WHERE agent_id = ?")
        .bind(agent_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Commit on success, best-effort rollback on failure.
async fn finish_immediate<T>(
    conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
    outcome: &DomainResult<T>,
) -> DomainResult<()> {
    if outcome.is_ok() {
        sqlx::query("COMMIT").execute(&mut **conn).await?;
    } else if sqlx::query("ROLLBACK").execute(&mut **conn).await.is_err() {
        tracing::warn!("rollback after failed immediate transaction also failed");
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    description: String,
    status: String,
    claimed_by: Option<String>,
    claimed_at: Option<i64>,
    completed_at: Option<i64>,
    priority: i64,
    wave: i64,
    owned_files: Option<String>,
    file_patterns: Option<String>,
    result: Option<String>,
    error: Option<String>,
}

impl TryFrom<TaskRow> for SwarmTask {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;
        let owned_files = row
            .owned_files
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let file_patterns = row
            .file_patterns
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(SwarmTask {
            id: row.id,
            description: row.description,
            status,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at,
            completed_at: row.completed_at,
            priority: row.priority,
            wave: row.wave,
            owned_files,
            file_patterns,
            result: row.result,
            error: row.error,
        })
    }
}
