//! Hook handlers: thin glue between host lifecycle events and the
//! coordinator's services. Handlers never perform agent work.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HookInput, HookResponse};
use crate::services::compaction::CompactionMonitor;
use crate::services::mode_registry::ModeRegistry;
use crate::services::project_memory::ProjectMemoryService;
use crate::services::recovery::{classify_text, edit_retry_directive};
use crate::services::session_context::{ContextCollector, SessionStateLocator};
use crate::domain::models::ErrorKind;
use crate::infrastructure::worktree::Worktree;

/// Keywords that activate an operational mode when seen in a prompt.
const MODE_KEYWORDS: &[(&str, &str)] = &[
    ("ultrawork", "swarm"),
    ("swarm", "swarm"),
    ("autopilot", "autopilot"),
    ("ralph", "ralph"),
    ("ultrathink", "deep-reasoning"),
];

/// State persisted by the setup hooks at `.omc/state/setup-state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupState {
    #[serde(rename = "lastCompletedStep")]
    pub last_completed_step: String,
    pub timestamp: chrono::DateTime<Utc>,
    #[serde(rename = "configType")]
    pub config_type: String,
}

/// Per-session state for looping modes (ralph / persistent / autopilot).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopModeState {
    pub active: bool,
    pub iterations: u32,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<Utc>>,
}

/// Shared services the handlers operate on.
pub struct HookServices {
    pub worktree: Worktree,
    pub compaction: CompactionMonitor,
    pub memory: ProjectMemoryService,
    pub locator: SessionStateLocator,
    pub modes: ModeRegistry,
}

impl HookServices {
    pub fn new(worktree: Worktree) -> Self {
        Self {
            compaction: CompactionMonitor::with_defaults(),
            memory: ProjectMemoryService::new(worktree.clone()),
            locator: SessionStateLocator::new(worktree.clone()),
            modes: ModeRegistry::new(worktree.clone()),
            worktree,
        }
    }

    /// `keyword-detector`: recognize mode keywords in the prompt and report
    /// the detected mode. Actually entering a mode is the mode registry's
    /// job on a later hook.
    pub fn keyword_detector(&self, input: &HookInput) -> DomainResult<HookResponse> {
        let Some(prompt) = input.prompt.as_deref() else {
            return Ok(HookResponse::proceed());
        };
        let lower = prompt.to_lowercase();
        for (keyword, mode) in MODE_KEYWORDS {
            if lower.contains(keyword) {
                return Ok(HookResponse::with_message(format!(
                    "Detected '{keyword}': {mode} mode is available for this request."
                )));
            }
        }
        Ok(HookResponse::proceed())
    }

    /// `stop-continuation`: reset the compaction warning budget and decide
    /// whether an active looping mode wants the turn to continue.
    pub fn stop_continuation(&self, input: &HookInput) -> DomainResult<HookResponse> {
        if let Some(session_id) = input.session_id.as_deref() {
            self.compaction.on_stop(session_id);
            for mode in ["ralph", "persistent"] {
                let state: Option<LoopModeState> = self.locator.read(session_id, mode)?;
                if state.is_some_and(|s| s.active) {
                    return Ok(HookResponse::with_message(format!(
                        "{mode} mode is active; continue with the next iteration."
                    )));
                }
            }
        }
        Ok(HookResponse::proceed())
    }

    /// `ralph`: toggle the ralph loop for this session.
    pub fn ralph(&self, input: &HookInput) -> DomainResult<HookResponse> {
        self.enter_loop_mode(input, "ralph")
    }

    /// `persistent-mode`: toggle the persistent loop for this session.
    pub fn persistent_mode(&self, input: &HookInput) -> DomainResult<HookResponse> {
        self.enter_loop_mode(input, "persistent")
    }

    fn enter_loop_mode(&self, input: &HookInput, mode: &str) -> DomainResult<HookResponse> {
        let Some(session_id) = input.session_id.as_deref() else {
            return Ok(HookResponse::proceed());
        };
        let mut state: LoopModeState =
            self.locator.read(session_id, mode)?.unwrap_or_default();
        if !state.active {
            state.active = true;
            state.started_at = Some(Utc::now());
        }
        state.iterations += 1;
        self.locator.write(session_id, mode, &state)?;
        Ok(HookResponse::with_message(format!(
            "{mode} mode active (iteration {})",
            state.iterations
        )))
    }

    /// `session-start`: ensure the `.omc/` layout exists and inject project
    /// memory plus any active-mode context.
    pub fn session_start(&self, _input: &HookInput) -> DomainResult<HookResponse> {
        self.worktree.ensure_layout()?;

        let memory = self.memory.load_or_scan();
        let mut collector = ContextCollector::new();
        let summary = self.memory.summary(&memory);
        collector.register("project-memory", summary);

        if let Some(marker) = self.modes.current("swarm")? {
            collector.register(
                "swarm",
                format!(
                    "A swarm started by {} is active in this worktree.",
                    marker.session_id
                ),
            );
        }

        let rendered = collector.render();
        if rendered.trim().is_empty() {
            Ok(HookResponse::proceed())
        } else {
            Ok(HookResponse::with_message(rendered))
        }
    }

    /// `session-end`: drop session-scoped loop state.
    pub fn session_end(&self, input: &HookInput) -> DomainResult<HookResponse> {
        if let Some(session_id) = input.session_id.as_deref() {
            for mode in ["ralph", "persistent", "autopilot"] {
                self.locator.clear(session_id, mode)?;
            }
        }
        Ok(HookResponse::proceed())
    }

    /// `pre-tool-use`: treat a user-supplied working directory as a hint;
    /// anything outside the trusted root is ignored with a diagnostic.
    pub fn pre_tool_use(&self, input: &HookInput) -> DomainResult<HookResponse> {
        if let Some(directory) = input.directory.as_deref() {
            if self
                .worktree
                .validate_working_directory(Some(Path::new(directory)))
                .is_err()
            {
                tracing::warn!(directory, "working directory outside trusted root; ignored");
            }
        }
        Ok(HookResponse::proceed())
    }

    /// `post-tool-use`: feed the compaction accumulator, learn hot paths,
    /// and convert edit-tool failures into a retry directive.
    pub fn post_tool_use(&self, input: &HookInput) -> DomainResult<HookResponse> {
        let tool_name = input.tool_name.as_deref().unwrap_or_default();
        self.memory.learn_from_tool(tool_name, input.tool_input.as_ref());

        let Some(output) = input.tool_output.as_deref() else {
            return Ok(HookResponse::proceed());
        };

        if classify_text(output, true) == Some(ErrorKind::EditError) {
            return Ok(HookResponse::with_message(edit_retry_directive(output)));
        }

        if let Some(session_id) = input.session_id.as_deref() {
            if let Some(notice) = self
                .compaction
                .observe_tool_output(session_id, tool_name, output)
            {
                return Ok(HookResponse::with_message(notice.message()));
            }
        }
        Ok(HookResponse::proceed())
    }

    /// `autopilot`: advance the per-session autopilot state machine.
    pub fn autopilot(&self, input: &HookInput) -> DomainResult<HookResponse> {
        self.enter_loop_mode(input, "autopilot")
    }

    /// `subagent-start`: count active subagents in session state.
    pub fn subagent_start(&self, input: &HookInput) -> DomainResult<HookResponse> {
        self.bump_subagents(input, 1)
    }

    /// `subagent-stop`: count down and surface compaction pressure caused
    /// by the subagent's transcript.
    pub fn subagent_stop(&self, input: &HookInput) -> DomainResult<HookResponse> {
        self.bump_subagents(input, -1)?;
        if let (Some(session_id), Some(output)) =
            (input.session_id.as_deref(), input.tool_output.as_deref())
        {
            if let Some(notice) = self
                .compaction
                .observe_tool_output(session_id, "task", output)
            {
                return Ok(HookResponse::with_message(notice.message()));
            }
        }
        Ok(HookResponse::proceed())
    }

    fn bump_subagents(&self, input: &HookInput, delta: i64) -> DomainResult<HookResponse> {
        let Some(session_id) = input.session_id.as_deref() else {
            return Ok(HookResponse::proceed());
        };
        let count: i64 = self
            .locator
            .read::<i64>(session_id, "subagents")?
            .unwrap_or(0);
        self.locator
            .write(session_id, "subagents", &(count + delta).max(0))?;
        Ok(HookResponse::proceed())
    }

    /// `pre-compact`: the host is about to compact; reset the warning
    /// budget so post-compaction pressure is reported afresh.
    pub fn pre_compact(&self, input: &HookInput) -> DomainResult<HookResponse> {
        if let Some(session_id) = input.session_id.as_deref() {
            self.compaction.on_stop(session_id);
        }
        Ok(HookResponse::proceed())
    }

    /// `setup-init` / `setup-maintenance`: record setup progress.
    pub fn setup(&self, input: &HookInput, step: &str) -> DomainResult<HookResponse> {
        let config_type = input
            .raw
            .get("configType")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let state = SetupState {
            last_completed_step: step.to_string(),
            timestamp: Utc::now(),
            config_type,
        };
        let path = self.worktree.resolve_omc_path("state/setup-state.json")?;
        crate::infrastructure::worktree::atomic_write_json(&path, &state)?;
        Ok(HookResponse::proceed())
    }

    /// `permission-request`: auto-approve inside an active autopilot
    /// session, otherwise stay silent and let the host prompt the user.
    pub fn permission_request(&self, input: &HookInput) -> DomainResult<HookResponse> {
        let Some(session_id) = input.session_id.as_deref() else {
            return Ok(HookResponse::proceed());
        };
        let autopilot: Option<LoopModeState> = self.locator.read(session_id, "autopilot")?;
        if autopilot.is_some_and(|s| s.active) {
            let tool = input.tool_name.as_deref().unwrap_or("tool");
            return Ok(HookResponse::with_message(format!(
                "Auto-approved {tool} (autopilot active)."
            )));
        }
        Ok(HookResponse::proceed())
    }
}
