//! Tool-calling loop
//!
//! AWAIT_MODEL -> EXECUTE_TOOLS -> AWAIT_MODEL ... -> DONE
//!
//! The model decides which tools to call; this engine only runs them in
//! request order and feeds results back. Tool-level errors become tool
//! result text, boundary errors abort the loop.

use crate::audit::ToolOutcome;
use crate::error::OrchestrationError;
use crate::llm::{invoke_within, ChatModel};
use crate::memory::{ToolInvocation, Turn};
use crate::models::{ModelResponse, ToolDefinition, ToolInput};
use crate::tools::ToolRegistry;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Tool-execution rounds allowed before the loop gives up
    pub max_tool_rounds: usize,
    /// Deadline for each model call
    pub round_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            round_timeout: DEFAULT_ROUND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Completed,
    RoundLimitReached,
    /// The upstream failed after a tool had already succeeded; `final_text`
    /// is that tool's result
    Interrupted,
}

/// One tool call as it actually ran
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub tool_name: String,
    pub arguments: Value,
    pub outcome: ToolOutcome,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub status: LoopStatus,
    /// Final model text; empty when the round limit was hit
    pub final_text: String,
    pub executions: Vec<ToolExecution>,
    pub model_calls: usize,
    /// Full per-exchange message list, tool turns included
    pub messages: Vec<Turn>,
}

impl LoopOutcome {
    pub fn any_tool_succeeded(&self) -> bool {
        self.executions
            .iter()
            .any(|e| e.outcome == ToolOutcome::Success)
    }

    /// PIN-like argument values sent to tools during this exchange
    pub fn supplied_pins(&self) -> Vec<String> {
        let mut pins = Vec::new();
        for execution in &self.executions {
            if let Value::Object(map) = &execution.arguments {
                for (key, value) in map {
                    if !key.to_ascii_lowercase().contains("pin") {
                        continue;
                    }
                    match value {
                        Value::String(s) if !s.trim().is_empty() => pins.push(s.trim().to_string()),
                        Value::Number(n) => pins.push(n.to_string()),
                        _ => {}
                    }
                }
            }
        }
        pins
    }
}

/// Runs the model/tool loop over one registry
pub struct ExecutionEngine {
    tool_registry: ToolRegistry,
    model: Arc<dyn ChatModel>,
    config: LoopConfig,
}

impl ExecutionEngine {
    pub fn new(tool_registry: ToolRegistry, model: Arc<dyn ChatModel>, config: LoopConfig) -> Self {
        Self {
            tool_registry,
            model,
            config,
        }
    }

    /// Drive the loop from an initial message list (system, window, user).
    pub async fn run(&self, mut messages: Vec<Turn>) -> Result<LoopOutcome> {
        let definitions = self.tool_registry.definitions();
        let mut executions = Vec::new();
        let mut model_calls = 0;
        // Latest successful tool result; a committed change must still be reported
        let mut committed: Option<String> = None;

        for round in 0..=self.config.max_tool_rounds {
            let response = match self.call_model(&messages, &definitions).await {
                Ok(response) => response,
                Err(e) => return interrupted(e, committed, executions, model_calls, messages),
            };
            model_calls += 1;

            if !response.has_tool_calls() {
                info!(round, model_calls, tools_run = executions.len(), "Tool loop done");
                messages.push(Turn::assistant(response.content.clone()));
                return Ok(LoopOutcome {
                    status: LoopStatus::Completed,
                    final_text: response.content,
                    executions,
                    model_calls,
                    messages,
                });
            }

            if round == self.config.max_tool_rounds {
                break;
            }

            debug!(round, requested = response.tool_calls.len(), "Executing tool calls");
            messages.push(Turn::assistant_with_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            // Identical requests within one model turn run once and share the result.
            let mut seen: HashMap<(String, String), String> = HashMap::new();

            for invocation in &response.tool_calls {
                let key = (invocation.name.clone(), invocation.arguments.to_string());
                if let Some(content) = seen.get(&key) {
                    warn!(tool_name = %invocation.name, "Duplicate tool call in one turn, reusing result");
                    messages.push(Turn::tool_result(invocation, content.clone()));
                    continue;
                }

                let (content, execution) = match self.execute_one(invocation).await {
                    Ok(done) => done,
                    Err(e) => return interrupted(e, committed, executions, model_calls, messages),
                };
                if execution.outcome == ToolOutcome::Success {
                    committed = Some(content.clone());
                }
                executions.push(execution);
                seen.insert(key, content.clone());
                messages.push(Turn::tool_result(invocation, content));
            }
        }

        warn!(
            max_tool_rounds = self.config.max_tool_rounds,
            model_calls,
            "Tool loop hit the round limit"
        );

        Ok(LoopOutcome {
            status: LoopStatus::RoundLimitReached,
            final_text: String::new(),
            executions,
            model_calls,
            messages,
        })
    }

    async fn call_model(&self, messages: &[Turn], tools: &[ToolDefinition]) -> Result<ModelResponse> {
        invoke_within(self.model.as_ref(), messages, tools, self.config.round_timeout).await
    }

    async fn execute_one(&self, invocation: &ToolInvocation) -> Result<(String, ToolExecution)> {
        let start = Instant::now();

        let input = ToolInput {
            tool_name: invocation.name.clone(),
            parameters: invocation.arguments.clone(),
        };

        let (content, outcome) = match self.tool_registry.get(&invocation.name) {
            Some(tool) => match tool.execute(&input).await {
                Ok(output) => (output.content, ToolOutcome::Success),
                Err(e) if e.is_tool_level() => {
                    warn!(tool_name = %invocation.name, error = %e, "Tool rejected request");
                    (e.tool_feedback(), ToolOutcome::Rejected)
                }
                Err(e) => return Err(e),
            },
            None => {
                warn!(tool_name = %invocation.name, "Tool not registered");
                let error = OrchestrationError::ToolNotFound(invocation.name.clone());
                (error.tool_feedback(), ToolOutcome::Unknown)
            }
        };

        let execution = ToolExecution {
            tool_name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
            outcome,
            execution_time_ms: start.elapsed().as_millis() as u64,
        };

        Ok((content, execution))
    }
}

/// Boundary failure mid-loop. Without a committed tool result the error
/// propagates; otherwise the loop ends on that result.
fn interrupted(
    error: OrchestrationError,
    committed: Option<String>,
    executions: Vec<ToolExecution>,
    model_calls: usize,
    messages: Vec<Turn>,
) -> Result<LoopOutcome> {
    let Some(final_text) = committed else {
        return Err(error);
    };

    warn!(error = %error, tools_run = executions.len(), "Upstream failed after a tool succeeded");
    Ok(LoopOutcome {
        status: LoopStatus::Interrupted,
        final_text,
        executions,
        model_calls,
        messages,
    })
}
