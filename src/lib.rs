//! OMC - multi-agent orchestration substrate
//!
//! Turns a single-user interactive coding assistant into a concurrent
//! multi-agent development environment:
//! - Durable swarm task pool with atomic claiming, lease-based ownership,
//!   heartbeat liveness, and file-scope affinity (SQLite, WAL mode)
//! - Recovery engine that repairs persisted conversation state after
//!   context-window and structural API rejections
//! - Preemptive compaction warnings before the window is exhausted
//! - Hook dispatch with input normalization and kill switches
//! - Complexity-tier model routing with an external-provider ladder
//! - Lazily learned project memory injected on session start

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{HookResponse, RoutingDecision, SwarmTask};
pub use infrastructure::worktree::Worktree;
pub use services::hooks::HookDispatcher;
pub use services::swarm::SwarmCoordinator;
