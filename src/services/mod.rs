//! Application services for the OMC orchestration substrate.

pub mod compaction;
pub mod file_affinity;
pub mod hooks;
pub mod mode_registry;
pub mod project_memory;
pub mod recovery;
pub mod routing;
pub mod session_context;
pub mod swarm;

pub use compaction::{estimate_tokens, CompactionMonitor, CompactionNotice};
pub use file_affinity::{glob_match, task_matches_patterns};
pub use hooks::HookDispatcher;
pub use mode_registry::{ModeMarker, ModeRegistry};
pub use project_memory::ProjectMemoryService;
pub use recovery::{RecoveryInput, RecoveryService, RetryLedger};
pub use routing::TaskRouter;
pub use session_context::{ContextCollector, SessionStateLocator};
pub use swarm::{SwarmCoordinator, SwarmStartConfig, DEFAULT_LEASE_TIMEOUT};
