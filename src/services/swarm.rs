//! Swarm coordinator: durable multi-agent task pool.
//!
//! Wraps the SQLite repository with mode exclusion, lease sweeping, and the
//! human-readable summary artifact. Agents are external processes; this
//! service only guarantees that each pending task is delivered to exactly
//! one of them and that dead agents' claims return to the pool.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ClaimOutcome, SwarmSession, SwarmStats, SwarmTask, TaskSpec};
use crate::infrastructure::sqlite::{
    create_pool, open_existing_pool, SwarmMigrator, SwarmRepository,
};
use crate::infrastructure::worktree::{atomic_write_file, process_session_id, Worktree};
use crate::services::file_affinity::{has_file_scope, task_matches_patterns};
use crate::services::mode_registry::ModeRegistry;

pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(300);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for `SwarmCoordinator::start`.
#[derive(Debug, Clone)]
pub struct SwarmStartConfig {
    pub agent_count: usize,
    pub tasks: Vec<TaskSpec>,
    pub lease_timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct SwarmCoordinator {
    worktree: Worktree,
    repo: SwarmRepository,
    registry: ModeRegistry,
    lease_timeout: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SwarmCoordinator {
    /// Start a fresh swarm: claim the mode marker, (re)create the schema,
    /// clear any previous pool, insert the initial batch, and start the
    /// stale-claim sweeper.
    pub async fn start(worktree: Worktree, config: SwarmStartConfig) -> DomainResult<Self> {
        if config.agent_count < 1 {
            return Err(DomainError::InvalidAgentCount(config.agent_count));
        }
        if config.tasks.is_empty() {
            return Err(DomainError::EmptyTaskList);
        }

        let session_id = process_session_id();
        let registry = ModeRegistry::new(worktree.clone());
        registry.enter("swarm", &session_id)?;

        let repo = match Self::initialize_pool(&worktree, &config, session_id).await {
            Ok(repo) => repo,
            Err(err) => {
                // Do not leave a dangling marker behind a failed start.
                let _ = registry.exit("swarm");
                return Err(err);
            }
        };

        let coordinator = Self {
            worktree,
            repo,
            registry,
            lease_timeout: config.lease_timeout.unwrap_or(DEFAULT_LEASE_TIMEOUT),
            sweeper: Mutex::new(None),
        };
        coordinator.spawn_sweeper();
        coordinator.write_summary().await;
        tracing::info!(
            tasks = config.tasks.len(),
            agents = config.agent_count,
            "swarm started"
        );
        Ok(coordinator)
    }

    async fn initialize_pool(
        worktree: &Worktree,
        config: &SwarmStartConfig,
        session_id: String,
    ) -> DomainResult<SwarmRepository> {
        let pool = create_pool(&worktree.swarm_db_path(), None)
            .await
            .map_err(|e| DomainError::DatabaseError(e.to_string()))?;
        SwarmMigrator::new(pool.clone())
            .ensure_schema()
            .await
            .map_err(|e| DomainError::DatabaseError(e.to_string()))?;

        let repo = SwarmRepository::new(pool);
        repo.clear_all().await?;
        repo.insert_tasks(&materialize_tasks(&config.tasks, 0)).await?;
        repo.upsert_session(&SwarmSession {
            session_id,
            started_at: now_millis(),
            completed_at: None,
            agent_count: config.agent_count as i64,
            active: true,
        })
        .await?;
        Ok(repo)
    }

    /// Connect to an existing swarm database, e.g. from a hook process or
    /// for cancellation. Fails with `NotInitialized` when no swarm was ever
    /// started in this worktree.
    pub async fn connect(worktree: Worktree) -> DomainResult<Self> {
        let db_path = worktree.swarm_db_path();
        if !db_path.exists() {
            return Err(DomainError::NotInitialized);
        }
        let pool = open_existing_pool(&db_path)
            .await
            .map_err(|_| DomainError::NotInitialized)?;
        SwarmMigrator::new(pool.clone())
            .ensure_schema()
            .await
            .map_err(|e| DomainError::DatabaseError(e.to_string()))?;

        let registry = ModeRegistry::new(worktree.clone());
        Ok(Self {
            worktree,
            repo: SwarmRepository::new(pool),
            registry,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            sweeper: Mutex::new(None),
        })
    }

    /// All-or-nothing batch insert; ids continue from the current maximum
    /// numeric id.
    pub async fn add_tasks(&self, batch: &[TaskSpec]) -> DomainResult<Vec<String>> {
        let start = self.repo.max_task_number().await?;
        let tasks = materialize_tasks(batch, start);
        let ids = tasks.iter().map(|t| t.id.clone()).collect();
        self.repo.insert_tasks(&tasks).await?;
        self.write_summary().await;
        Ok(ids)
    }

    /// Atomically claim the smallest `(priority, id)` pending task.
    pub async fn claim_task(&self, agent_id: &str) -> DomainResult<ClaimOutcome> {
        let outcome = self.repo.claim_next(agent_id, now_millis()).await?;
        if matches!(outcome, ClaimOutcome::Claimed { .. }) {
            self.write_summary().await;
        }
        Ok(outcome)
    }

    /// Claim the first pending task (in priority order) whose file scope
    /// overlaps any of the supplied patterns; fall back to a regular claim
    /// when nothing overlaps.
    pub async fn claim_task_for_files(
        &self,
        agent_id: &str,
        patterns: &[String],
    ) -> DomainResult<ClaimOutcome> {
        if !patterns.is_empty() {
            let pending = self.repo.list_pending().await?;
            let candidate = pending
                .iter()
                .find(|task| has_file_scope(task) && task_matches_patterns(task, patterns));
            if let Some(task) = candidate {
                let outcome = self
                    .repo
                    .claim_specific(agent_id, &task.id, now_millis())
                    .await?;
                if matches!(outcome, ClaimOutcome::Claimed { .. }) {
                    self.write_summary().await;
                }
                return Ok(outcome);
            }
        }
        self.claim_task(agent_id).await
    }

    /// Returns `false` (and mutates nothing) unless `agent_id` owns the
    /// claimed task.
    pub async fn complete_task(
        &self,
        agent_id: &str,
        task_id: &str,
        result: Option<&str>,
    ) -> DomainResult<bool> {
        let done = self
            .repo
            .complete(agent_id, task_id, result, now_millis())
            .await?;
        if done {
            self.write_summary().await;
        } else {
            tracing::warn!(agent_id, task_id, "complete refused: not owner");
        }
        Ok(done)
    }

    pub async fn fail_task(
        &self,
        agent_id: &str,
        task_id: &str,
        error: &str,
    ) -> DomainResult<bool> {
        let failed = self.repo.fail(agent_id, task_id, error, now_millis()).await?;
        if failed {
            self.write_summary().await;
        } else {
            tracing::warn!(agent_id, task_id, "fail refused: not owner");
        }
        Ok(failed)
    }

    pub async fn release_task(&self, agent_id: &str, task_id: &str) -> DomainResult<bool> {
        let released = self.repo.release(agent_id, task_id).await?;
        if released {
            self.write_summary().await;
        }
        Ok(released)
    }

    /// Re-claim a failed task by the same or a different agent.
    pub async fn retry_task(&self, agent_id: &str, task_id: &str) -> DomainResult<SwarmTask> {
        let task = self.repo.retry(agent_id, task_id, now_millis()).await?;
        self.write_summary().await;
        Ok(task)
    }

    pub async fn heartbeat(&self, agent_id: &str) -> DomainResult<()> {
        self.repo.heartbeat(agent_id, now_millis()).await
    }

    /// Release expired claims whose owners stopped heartbeating. Returns
    /// the number of released tasks.
    pub async fn cleanup_stale_claims(&self) -> DomainResult<u64> {
        let released = self
            .repo
            .cleanup_stale_claims(self.lease_timeout.as_millis() as i64, now_millis())
            .await?;
        if released > 0 {
            tracing::info!(released, "stale claims swept back to pending");
            self.write_summary().await;
        }
        Ok(released)
    }

    pub async fn status(&self) -> DomainResult<SwarmStats> {
        self.repo.stats().await
    }

    pub async fn list_tasks(&self) -> DomainResult<Vec<SwarmTask>> {
        self.repo.list_tasks().await
    }

    /// Mark the session inactive, write the final summary, stop the
    /// sweeper, close handles, and remove the mode marker. The database is
    /// preserved for postmortem analysis.
    pub async fn cancel(&self) -> DomainResult<()> {
        self.repo.mark_session_inactive(now_millis()).await?;
        self.write_summary().await;
        self.stop_sweeper();
        self.repo.pool().close().await;
        self.registry.exit("swarm")?;
        tracing::info!("swarm cancelled");
        Ok(())
    }

    fn spawn_sweeper(&self) {
        let repo = self.repo.clone();
        let worktree = self.worktree.clone();
        let lease_ms = self.lease_timeout.as_millis() as i64;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh swarm is
            // not swept before any agent had a chance to claim.
            interval.tick().await;
            loop {
                interval.tick().await;
                let now = now_millis();
                match repo.cleanup_stale_claims(lease_ms, now).await {
                    Ok(released) if released > 0 => {
                        tracing::info!(released, "sweeper released stale claims");
                        if let Ok(stats) = repo.stats().await {
                            write_summary_artifact(&worktree, &stats);
                        }
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "sweeper pass failed"),
                }
            }
        });
        *self.sweeper.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    async fn write_summary(&self) {
        match self.repo.stats().await {
            Ok(stats) => write_summary_artifact(&self.worktree, &stats),
            Err(err) => tracing::debug!(error = %err, "summary stats unavailable"),
        }
    }
}

impl Drop for SwarmCoordinator {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

fn materialize_tasks(specs: &[TaskSpec], start_after: u64) -> Vec<SwarmTask> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let mut task = SwarmTask::new(
                format!("task-{}", start_after + i as u64 + 1),
                spec.description.clone(),
            );
            task.priority = spec.priority.unwrap_or(0);
            task.wave = spec.wave.unwrap_or(1);
            task.owned_files = spec.owned_files.clone();
            task.file_patterns = spec.file_patterns.clone();
            task
        })
        .collect()
}

/// Render and atomically write the swarm summary. Readers may see an older
/// or newer summary but never a torn one.
fn write_summary_artifact(worktree: &Worktree, stats: &SwarmStats) {
    let mut out = String::new();
    out.push_str("# Swarm summary\n\n");
    out.push_str(&format!(
        "- pending: {}\n- claimed: {}\n- done: {}\n- failed: {}\n- total: {}\n",
        stats.pending,
        stats.claimed,
        stats.done,
        stats.failed,
        stats.total(),
    ));

    if !stats.claims_by_agent.is_empty() {
        out.push_str("\n## Active claims\n\n");
        for (agent, count) in &stats.claims_by_agent {
            out.push_str(&format!("- {agent}: {count}\n"));
        }
    }
    if let Some(oldest) = &stats.oldest_pending {
        out.push_str(&format!("\nOldest pending: {oldest}\n"));
    }
    if let Some((task_id, error)) = &stats.most_recent_failure {
        out.push_str(&format!("Most recent failure: {task_id} ({error})\n"));
    }

    let path = worktree.swarm_summary_path();
    if let Err(err) = atomic_write_file(&path, out.as_bytes()) {
        tracing::warn!(error = %err, "failed to write swarm summary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn worktree() -> (TempDir, Worktree) {
        let dir = TempDir::new().unwrap();
        let tree = Worktree::at_root(dir.path());
        tree.ensure_omc_dir("state").unwrap();
        (dir, tree)
    }

    fn specs(descriptions: &[&str]) -> Vec<TaskSpec> {
        descriptions.iter().map(|d| TaskSpec::new(*d)).collect()
    }

    async fn start(tree: &Worktree, tasks: Vec<TaskSpec>) -> SwarmCoordinator {
        SwarmCoordinator::start(
            tree.clone(),
            SwarmStartConfig {
                agent_count: 2,
                tasks,
                lease_timeout: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_rejects_empty_tasks() {
        let (_dir, tree) = worktree();
        let err = SwarmCoordinator::start(
            tree,
            SwarmStartConfig {
                agent_count: 1,
                tasks: vec![],
                lease_timeout: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DomainError::EmptyTaskList));
    }

    #[tokio::test]
    async fn test_start_claims_mode_marker() {
        let (_dir, tree) = worktree();
        let coordinator = start(&tree, specs(&["one"])).await;

        let second = SwarmCoordinator::start(
            tree.clone(),
            SwarmStartConfig {
                agent_count: 1,
                tasks: specs(&["other"]),
                lease_timeout: None,
            },
        )
        .await;
        assert!(matches!(second, Err(DomainError::ModeInUse { .. })));

        coordinator.cancel().await.unwrap();
        // After cancel the marker is gone but the database survives.
        assert!(tree.swarm_db_path().exists());
    }

    #[tokio::test]
    async fn test_priority_claim_scenario() {
        let (_dir, tree) = worktree();
        let coordinator = start(
            &tree,
            vec![
                TaskSpec {
                    description: "Low priority".to_string(),
                    priority: Some(10),
                    ..Default::default()
                },
                TaskSpec {
                    description: "High priority".to_string(),
                    priority: Some(1),
                    ..Default::default()
                },
                TaskSpec {
                    description: "Mid priority".to_string(),
                    priority: Some(5),
                    ..Default::default()
                },
            ],
        )
        .await;

        let outcome = coordinator.claim_task("a").await.unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::Claimed {
                task_id: "task-2".to_string(),
                description: "High priority".to_string(),
            }
        );
        coordinator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_affinity_claim_and_fallback() {
        let (_dir, tree) = worktree();
        let coordinator = start(
            &tree,
            vec![
                TaskSpec {
                    description: "auth".to_string(),
                    owned_files: Some(vec!["src/auth/login.ts".to_string()]),
                    ..Default::default()
                },
                TaskSpec {
                    description: "api".to_string(),
                    owned_files: Some(vec!["src/api/routes.ts".to_string()]),
                    ..Default::default()
                },
            ],
        )
        .await;

        let outcome = coordinator
            .claim_task_for_files("a", &["src/auth/*".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.task_id(), Some("task-1"));
        coordinator.release_task("a", "task-1").await.unwrap();

        // No overlap: falls back to the regular (priority, id) claim.
        let outcome = coordinator
            .claim_task_for_files("a", &["src/hooks/*".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.task_id(), Some("task-1"));
        coordinator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_tasks_continues_ids() {
        let (_dir, tree) = worktree();
        let coordinator = start(&tree, specs(&["one", "two"])).await;

        let ids = coordinator.add_tasks(&specs(&["three"])).await.unwrap();
        assert_eq!(ids, vec!["task-3".to_string()]);
        coordinator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_database() {
        let (_dir, tree) = worktree();
        let err = SwarmCoordinator::connect(tree).await.unwrap_err();
        assert!(matches!(err, DomainError::NotInitialized));
    }

    #[tokio::test]
    async fn test_summary_artifact_written() {
        let (_dir, tree) = worktree();
        let coordinator = start(&tree, specs(&["one"])).await;
        coordinator.claim_task("agent-a").await.unwrap();

        let summary = std::fs::read_to_string(tree.swarm_summary_path()).unwrap();
        assert!(summary.contains("claimed: 1"));
        assert!(summary.contains("agent-a"));
        coordinator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_and_ownership() {
        let (_dir, tree) = worktree();
        let coordinator = start(&tree, specs(&["one"])).await;
        coordinator.claim_task("a").await.unwrap();

        assert!(!coordinator.complete_task("b", "task-1", None).await.unwrap());
        assert!(coordinator
            .complete_task("a", "task-1", Some("finished"))
            .await
            .unwrap());
        assert_eq!(
            coordinator.claim_task("b").await.unwrap(),
            ClaimOutcome::NoneAvailable
        );
        coordinator.cancel().await.unwrap();
    }
}
