//! Hook dispatcher: normalize, validate, kill-switch, route, and never
//! crash the host.

use serde_json::Value;

use crate::domain::models::{HookInput, HookResponse, HookType};
use crate::infrastructure::worktree::Worktree;
use crate::services::hooks::handlers::HookServices;
use crate::services::hooks::kill_switch::{hook_skipped, omc_disabled};

pub struct HookDispatcher {
    services: HookServices,
}

impl HookDispatcher {
    pub fn new(worktree: Worktree) -> Self {
        Self {
            services: HookServices::new(worktree),
        }
    }

    pub fn services(&self) -> &HookServices {
        &self.services
    }

    /// Process one hook invocation. Every failure path degrades to
    /// `{continue: true}`; the host never sees an error from here.
    pub fn process_hook(&self, hook_name: &str, raw: Value) -> HookResponse {
        // Kill switches come first; the global one dominates.
        if omc_disabled() {
            return HookResponse::proceed();
        }

        let hook_type = HookType::from_name(hook_name);
        if hook_type == HookType::Unknown {
            tracing::debug!(hook_name, "unknown hook type");
            return HookResponse::proceed();
        }
        if hook_skipped(hook_name) {
            tracing::debug!(hook_name, "hook suppressed by OMC_SKIP_HOOKS");
            return HookResponse::proceed();
        }

        let input = HookInput::normalize(raw);
        let missing = input.missing_keys(hook_type.required_keys());
        if !missing.is_empty() {
            tracing::warn!(hook_name, ?missing, "missing keys; hook skipped");
            return HookResponse::proceed();
        }

        match self.dispatch(hook_type, &input) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(hook_name, error = %err, "[HUD] hook handler failed");
                HookResponse::proceed()
            }
        }
    }

    fn dispatch(
        &self,
        hook_type: HookType,
        input: &HookInput,
    ) -> crate::domain::errors::DomainResult<HookResponse> {
        let services = &self.services;
        match hook_type {
            HookType::KeywordDetector => services.keyword_detector(input),
            HookType::StopContinuation => services.stop_continuation(input),
            HookType::Ralph => services.ralph(input),
            HookType::PersistentMode => services.persistent_mode(input),
            HookType::SessionStart => services.session_start(input),
            HookType::SessionEnd => services.session_end(input),
            HookType::PreToolUse => services.pre_tool_use(input),
            HookType::PostToolUse => services.post_tool_use(input),
            HookType::Autopilot => services.autopilot(input),
            HookType::SubagentStart => services.subagent_start(input),
            HookType::SubagentStop => services.subagent_stop(input),
            HookType::PreCompact => services.pre_compact(input),
            HookType::SetupInit => services.setup(input, "init"),
            HookType::SetupMaintenance => services.setup(input, "maintenance"),
            HookType::PermissionRequest => services.permission_request(input),
            HookType::Unknown => Ok(HookResponse::proceed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hooks::kill_switch::reset_skip_cache;
    use serde_json::json;
    use tempfile::TempDir;

    fn dispatcher() -> (TempDir, HookDispatcher) {
        let dir = TempDir::new().unwrap();
        let tree = Worktree::at_root(dir.path());
        tree.ensure_omc_dir("state").unwrap();
        (dir, HookDispatcher::new(tree))
    }

    #[test]
    fn test_unknown_hook_continues() {
        let (_dir, dispatcher) = dispatcher();
        let response = dispatcher.process_hook("made-up-hook", json!({}));
        assert_eq!(response, HookResponse::proceed());
    }

    #[test]
    fn test_null_payload_continues() {
        let (_dir, dispatcher) = dispatcher();
        let response = dispatcher.process_hook("pre-tool-use", Value::Null);
        assert!(response.continue_);
    }

    #[test]
    fn test_missing_required_keys_continue() {
        let (_dir, dispatcher) = dispatcher();
        // permission-request requires sessionId, directory, toolName.
        let response = dispatcher.process_hook("permission-request", json!({"sessionId": "s"}));
        assert_eq!(response, HookResponse::proceed());
    }

    #[test]
    fn test_snake_case_equivalence() {
        let (dir, dispatcher) = dispatcher();
        let snake = dispatcher.process_hook(
            "pre-tool-use",
            json!({
                "session_id": "s1",
                "tool_name": "Read",
                "tool_input": {"file_path": "x"},
                "cwd": dir.path().to_string_lossy()
            }),
        );
        let camel = dispatcher.process_hook(
            "pre-tool-use",
            json!({
                "sessionId": "s1",
                "toolName": "Read",
                "toolInput": {"file_path": "x"},
                "directory": dir.path().to_string_lossy()
            }),
        );
        assert_eq!(snake, camel);
    }

    #[test]
    fn test_disable_omc_dominates() {
        let (_dir, dispatcher) = dispatcher();
        temp_env::with_var("DISABLE_OMC", Some("1"), || {
            // keyword-detector would otherwise emit a message.
            let response = dispatcher.process_hook(
                "keyword-detector",
                json!({"sessionId": "s", "prompt": "ultrawork fix bug", "directory": "/tmp/x"}),
            );
            assert_eq!(response, HookResponse::proceed());
        });
    }

    #[test]
    fn test_skip_list_suppresses_individually() {
        let (_dir, dispatcher) = dispatcher();
        temp_env::with_var(
            "OMC_SKIP_HOOKS",
            Some("keyword-detector, pre-tool-use"),
            || {
                reset_skip_cache();
                let response = dispatcher.process_hook(
                    "keyword-detector",
                    json!({"sessionId": "s", "prompt": "ultrawork fix bug", "directory": "/tmp/x"}),
                );
                assert_eq!(response, HookResponse::proceed());
                assert!(response.message.is_none());

                // A hook not on the list runs normally.
                let response = dispatcher.process_hook(
                    "post-tool-use",
                    json!({"sessionId": "s", "toolName": "Read", "tool_response": "ok"}),
                );
                assert!(response.continue_);
            },
        );
        reset_skip_cache();
    }

    #[test]
    fn test_every_hook_returns_boolean_continue() {
        let (_dir, dispatcher) = dispatcher();
        let hooks = [
            "keyword-detector",
            "stop-continuation",
            "ralph",
            "persistent-mode",
            "session-start",
            "session-end",
            "pre-tool-use",
            "post-tool-use",
            "autopilot",
            "subagent-start",
            "subagent-stop",
            "pre-compact",
            "setup-init",
            "setup-maintenance",
            "permission-request",
        ];
        for hook in hooks {
            let response = dispatcher.process_hook(
                hook,
                json!({"sessionId": "pid-1-2", "directory": "/tmp/x", "toolName": "Read"}),
            );
            let value = serde_json::to_value(&response).unwrap();
            assert!(
                value.get("continue").is_some_and(Value::is_boolean),
                "{hook} must produce a boolean continue"
            );
        }
    }
}
