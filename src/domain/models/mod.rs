//! Domain models for the OMC orchestration substrate.

pub mod config;
pub mod hook;
pub mod memory;
pub mod recovery;
pub mod routing;
pub mod session;
pub mod task;

pub use config::{
    CompactionConfig, LoggingConfig, OmcConfig, ProviderConfig, ProvidersConfig, RoutingConfig,
    SwarmConfig,
};
pub use hook::{HookInput, HookResponse, HookType};
pub use memory::{
    BuildCommands, DetectedFramework, DetectedLanguage, HotPath, ProjectMemory, TechStack,
    UserDirective, MEMORY_SCHEMA_VERSION,
};
pub use recovery::{
    ConversationPart, ErrorKind, PartType, RecoveryResult, TokenLimitInfo,
};
pub use routing::{
    ContextSignals, Domain, ExternalResolution, ImpactScope, LexicalSignals, ModelPreference,
    Provider, QuestionDepth, Reversibility, RoutingContext, RoutingDecision, StructuralSignals,
    TaskSignals, Tier,
};
pub use session::{SchemaVersion, SwarmSession};
pub use task::{ClaimOutcome, Heartbeat, SwarmStats, SwarmTask, TaskSpec, TaskStatus};
