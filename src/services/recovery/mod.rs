//! Recovery engine: turn a user-visible API rejection into a repaired
//! on-disk conversation or a structured recovery message for the host.

pub mod classifier;
pub mod ledger;
pub mod parts;
pub mod repair;
pub mod token_limits;

pub use classifier::{candidate_texts, classify, classify_text};
pub use ledger::{AttemptPermit, RetryConfig, RetryLedger, TruncateConfig};
pub use parts::{MessageMeta, PartStore, SYNTHETIC_THINKING_PART_ID};
pub use repair::{edit_retry_directive, RepairEngine};
pub use token_limits::parse_token_limit_error;

use regex::Regex;
use serde_json::Value;

use crate::domain::models::{ErrorKind, RecoveryResult};
use crate::infrastructure::logging::DebugLog;

/// Input for one unified recovery attempt.
#[derive(Debug, Clone, Default)]
pub struct RecoveryInput {
    pub session_id: String,
    /// The opaque error value as delivered by the host.
    pub error: Value,
    /// Tool output text, when the failure came from a tool.
    pub tool_output: Option<String>,
    /// Id of the failed assistant message, when known.
    pub message_id: Option<String>,
    /// Live tool_use ids from the in-flight structure, when known.
    pub live_tool_use_ids: Option<Vec<String>>,
}

/// Unified recovery dispatch. Owns the repair engine, the retry ledger,
/// and the debug logs.
pub struct RecoveryService {
    engine: RepairEngine,
    ledger: RetryLedger,
    context_log: DebugLog,
}

impl RecoveryService {
    pub fn new(engine: RepairEngine, ledger: RetryLedger) -> Self {
        Self {
            engine,
            ledger,
            context_log: DebugLog::context_recovery(),
        }
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    /// Try recovery kinds in order: context-window limit, then session
    /// structure, then edit errors. Short-circuits on the first attempt
    /// that succeeds. Callers surface `message` to the host verbatim.
    pub fn handle_recovery(&self, input: &RecoveryInput) -> RecoveryResult {
        let context = self.try_context_window(input);
        if context.attempted {
            return context;
        }

        let structural = self.try_session_structural(input);
        if structural.attempted {
            return structural;
        }

        self.try_edit_error(input)
    }

    fn try_context_window(&self, input: &RecoveryInput) -> RecoveryResult {
        let Some(info) = parse_token_limit_error(&input.error) else {
            return RecoveryResult::not_attempted();
        };

        let kind = ErrorKind::ContextWindowLimit;
        match self.ledger.begin_attempt(&input.session_id, kind) {
            AttemptPermit::Allowed(attempt) => {
                self.context_log.line(&format!(
                    "session {} attempt {attempt}: {} > {} tokens ({})",
                    input.session_id, info.current_tokens, info.max_tokens, info.error_type
                ));
                RecoveryResult::succeeded(
                    kind,
                    format!(
                        "Context window exceeded: {} tokens used of a {} token limit. \
                         Compact the conversation (summarize completed work, drop stale \
                         tool output) before continuing.",
                        info.current_tokens, info.max_tokens
                    ),
                )
            }
            AttemptPermit::Exhausted => self.exhausted(kind, &input.session_id),
        }
    }

    fn try_session_structural(&self, input: &RecoveryInput) -> RecoveryResult {
        let Some(kind) = classify(&input.error, false) else {
            return RecoveryResult::not_attempted();
        };
        let error_index = extract_message_index(&input.error);

        match kind {
            ErrorKind::ToolResultMissing => {
                self.run_repair(input, kind, |engine| {
                    let message_id = input.message_id.as_deref().unwrap_or_default();
                    if message_id.is_empty() {
                        // Without a target message, repair every assistant
                        // message that has dangling tool_use parts.
                        let mut total = 0;
                        for id in engine.store().list_message_ids() {
                            total += engine.repair_tool_result_missing(
                                &input.session_id,
                                &id,
                                None,
                            )?;
                        }
                        Ok(total)
                    } else {
                        engine.repair_tool_result_missing(
                            &input.session_id,
                            message_id,
                            input.live_tool_use_ids.as_deref(),
                        )
                    }
                })
            }
            ErrorKind::ThinkingBlockOrder => self.run_repair(input, kind, |engine| {
                engine.repair_thinking_block_order(&input.session_id, error_index)
            }),
            ErrorKind::ThinkingDisabledViolation => {
                self.run_repair(input, kind, |engine| engine.repair_thinking_disabled())
            }
            ErrorKind::EmptyContent => self.run_repair(input, kind, |engine| {
                engine.repair_empty_content(
                    &input.session_id,
                    error_index,
                    input.message_id.as_deref(),
                )
            }),
            ErrorKind::ContextWindowLimit | ErrorKind::EditError => {
                RecoveryResult::not_attempted()
            }
        }
    }

    fn run_repair<F>(&self, input: &RecoveryInput, kind: ErrorKind, repair: F) -> RecoveryResult
    where
        F: FnOnce(&RepairEngine) -> crate::domain::errors::DomainResult<usize>,
    {
        match self.ledger.begin_attempt(&input.session_id, kind) {
            AttemptPermit::Exhausted => self.exhausted(kind, &input.session_id),
            AttemptPermit::Allowed(_) => match repair(&self.engine) {
                Ok(mutated) if mutated > 0 => RecoveryResult::succeeded(
                    kind,
                    format!(
                        "Repaired {mutated} conversation part(s) ({}). Retry the request.",
                        kind.as_str()
                    ),
                ),
                Ok(_) => RecoveryResult::failed(
                    kind,
                    format!("No conversation parts needed repair for {}.", kind.as_str()),
                ),
                Err(err) => {
                    tracing::warn!(error = %err, kind = kind.as_str(), "repair failed");
                    RecoveryResult::failed(kind, format!("Repair failed: {err}"))
                }
            },
        }
    }

    /// Truncation-based recovery for oversized tool outputs feeding a
    /// context-window failure. Returns the truncated text, or `None` when
    /// the output is under the minimum size or the truncation budget for
    /// this session is spent. Keeps the leading share of the output and
    /// cuts at a newline where possible.
    pub fn truncate_tool_output(&self, session_id: &str, output: &str) -> Option<String> {
        let config = self.ledger.truncate_config();
        if output.len() < config.min_output_size {
            return None;
        }
        match self.ledger.begin_truncate(session_id) {
            AttemptPermit::Exhausted => None,
            AttemptPermit::Allowed(attempt) => {
                let mut target = (output.len() as f64 * config.target_ratio) as usize;
                while !output.is_char_boundary(target) {
                    target -= 1;
                }
                let cut = output[..target].rfind('\n').unwrap_or(target);
                self.context_log.line(&format!(
                    "session {session_id}: truncation #{attempt}, {} -> {cut} chars",
                    output.len()
                ));
                Some(format!(
                    "{}\n\n[output truncated to fit the context window]",
                    &output[..cut]
                ))
            }
        }
    }

    fn try_edit_error(&self, input: &RecoveryInput) -> RecoveryResult {
        let Some(tool_output) = input.tool_output.as_deref() else {
            return RecoveryResult::not_attempted();
        };
        if classify_text(tool_output, true) != Some(ErrorKind::EditError) {
            return RecoveryResult::not_attempted();
        }
        RecoveryResult::succeeded(
            ErrorKind::EditError,
            edit_retry_directive(tool_output),
        )
    }

    fn exhausted(&self, kind: ErrorKind, session_id: &str) -> RecoveryResult {
        tracing::warn!(session_id, kind = kind.as_str(), "recovery exhausted");
        RecoveryResult {
            attempted: true,
            success: false,
            message: Some(format!(
                "Recovery exhausted for {} after repeated attempts; manual intervention \
                 is required.",
                kind.as_str()
            )),
            error_type: Some(kind.as_str().to_string()),
        }
    }
}

/// Pull the `messages.<n>` index out of the error text, when present.
pub fn extract_message_index(error: &Value) -> Option<usize> {
    let haystack = classifier::joined_haystack(error);
    let re = Regex::new(r"messages\.(\d+)").ok()?;
    re.captures(&haystack)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}
