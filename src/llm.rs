//! Language-model boundary
//!
//! `ChatModel` is the only way the orchestrator talks to a model.
//! `ScriptedModel` is a deterministic stand-in used by tests and the demo
//! binary.

use crate::error::OrchestrationError;
use crate::memory::{Role, Turn};
use crate::models::{ModelResponse, ToolDefinition};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Trait for model inference (LLM controlled)
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Submit an ordered message list; `tools` may be empty.
    async fn invoke(&self, messages: &[Turn], tools: &[ToolDefinition]) -> Result<ModelResponse>;
}

/// `invoke` with a deadline; running past `limit` is `UpstreamUnavailable`
pub async fn invoke_within(
    model: &dyn ChatModel,
    messages: &[Turn],
    tools: &[ToolDefinition],
    limit: Duration,
) -> Result<ModelResponse> {
    match tokio::time::timeout(limit, model.invoke(messages, tools)).await {
        Ok(result) => result,
        Err(_) => Err(OrchestrationError::UpstreamUnavailable(format!(
            "model call exceeded {:?}",
            limit
        ))),
    }
}

/// One scripted model reply
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(ModelResponse),
    /// Answer with the content of the latest `tool` turn
    EchoLastToolResult,
    /// Fail as an unreachable upstream would
    Fail(String),
    /// Sleep before answering, to exercise timeouts
    Delay(Duration, ModelResponse),
}

/// Replays a fixed sequence of replies and records every request
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that must never be called
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Message lists received so far, in call order
    pub fn requests(&self) -> Vec<Vec<Turn>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, messages: &[Turn], _tools: &[ToolDefinition]) -> Result<ModelResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let step = self
            .steps
            .lock()
            .map_err(|_| OrchestrationError::LlmError("script lock poisoned".to_string()))?
            .pop_front();

        match step {
            Some(ScriptStep::Reply(response)) => Ok(response),
            Some(ScriptStep::EchoLastToolResult) => {
                let content = messages
                    .iter()
                    .rev()
                    .find(|t| t.role == Role::Tool)
                    .map(|t| t.content.clone())
                    .unwrap_or_default();
                Ok(ModelResponse::text(content))
            }
            Some(ScriptStep::Fail(reason)) => Err(OrchestrationError::UpstreamUnavailable(reason)),
            Some(ScriptStep::Delay(duration, response)) => {
                tokio::time::sleep(duration).await;
                Ok(response)
            }
            None => Err(OrchestrationError::LlmError(
                "scripted model has no more replies".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolInvocation;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_replays_in_order_and_records_requests() {
        let model = ScriptedModel::new(vec![
            ScriptStep::Reply(ModelResponse::calls(vec![ToolInvocation::new(
                "c1",
                "view_card_details",
                json!({}),
            )])),
            ScriptStep::EchoLastToolResult,
        ]);

        let first = model.invoke(&[Turn::user("cards?")], &[]).await.unwrap();
        assert!(first.has_tool_calls());

        let call = &first.tool_calls[0];
        let second = model
            .invoke(&[Turn::user("cards?"), Turn::tool_result(call, "one card")], &[])
            .await
            .unwrap();
        assert_eq!(second.content, "one card");

        assert_eq!(model.call_count(), 2);
        assert!(model.invoke(&[], &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_invoke_within_deadline() {
        let model = ScriptedModel::new(vec![
            ScriptStep::Reply(ModelResponse::text("fast")),
            ScriptStep::Delay(Duration::from_secs(3600), ModelResponse::text("slow")),
        ]);

        let fast = invoke_within(&model, &[Turn::user("hi")], &[], Duration::from_millis(50)).await;
        assert_eq!(fast.unwrap().content, "fast");

        let slow = invoke_within(&model, &[Turn::user("hi")], &[], Duration::from_millis(50)).await;
        assert!(matches!(slow, Err(OrchestrationError::UpstreamUnavailable(_))));
    }
}
