//! Gemini API client
//!
//! Implements `ChatModel` over the `generateContent` REST endpoint with
//! function calling. Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::llm::ChatModel;
use crate::memory::{Role, ToolInvocation, Turn};
use crate::models::{ModelResponse, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| {
                OrchestrationError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.0,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn invoke(&self, messages: &[Turn], tools: &[ToolDefinition]) -> crate::Result<ModelResponse> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::UpstreamUnavailable(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = build_request(messages, tools, self.temperature);

        debug!(
            model = %self.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::UpstreamUnavailable(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::UpstreamUnavailable(format!(
                "Gemini API returned {}",
                status
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let parsed = parse_response(gemini_response)?;

        info!(
            tool_calls = parsed.tool_calls.len(),
            text_len = parsed.content.len(),
            "Gemini response received"
        );

        Ok(parsed)
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolGroup>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolGroup {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        ..Part::default()
    }
}

/// Gemini rejects object schemas without properties; drop them instead.
fn declaration_parameters(schema: &Value) -> Option<Value> {
    let empty = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.is_empty())
        .unwrap_or(true);

    if empty {
        None
    } else {
        Some(schema.clone())
    }
}

fn build_request(messages: &[Turn], tools: &[ToolDefinition], temperature: f32) -> GeminiRequest {
    let mut system_instruction = None;
    let mut contents: Vec<Content> = Vec::with_capacity(messages.len());

    for turn in messages {
        match turn.role {
            Role::System => {
                if system_instruction.is_none() {
                    system_instruction = Some(Content {
                        role: None,
                        parts: vec![text_part(&turn.content)],
                    });
                }
            }
            Role::User => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![text_part(&turn.content)],
            }),
            Role::Assistant => {
                let mut parts = Vec::with_capacity(turn.tool_calls.len() + 1);
                if !turn.content.is_empty() {
                    parts.push(text_part(&turn.content));
                }
                for call in &turn.tool_calls {
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..Part::default()
                    });
                }
                contents.push(Content {
                    role: Some("model".to_string()),
                    parts,
                });
            }
            Role::Tool => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        name: turn.name.clone().unwrap_or_default(),
                        response: json!({ "content": turn.content }),
                    }),
                    ..Part::default()
                };

                // Consecutive tool results answer one model turn; keep them together.
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(Content {
                        role: Some("user".to_string()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    let tools = if tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolGroup {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: declaration_parameters(&t.parameters),
                })
                .collect(),
        }]
    };

    GeminiRequest {
        contents,
        system_instruction,
        tools,
        generation_config: GenerationConfig {
            temperature,
            top_p: 0.9,
            max_output_tokens: 1024,
        },
    }
}

fn parse_response(response: GeminiResponse) -> crate::Result<ModelResponse> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| OrchestrationError::LlmError("No response from Gemini API".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in content.parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            let id = format!("call_{}", Uuid::new_v4().simple());
            tool_calls.push(ToolInvocation::new(id, call.name, call.args));
        }
    }

    Ok(ModelResponse {
        content: text.trim().to_string(),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let call = ToolInvocation::new("c1", "list_recent_transactions", json!({"count": 3}));
        let messages = vec![
            Turn::system("You are a banking assistant"),
            Turn::user("Show my last 3 transactions"),
            Turn::assistant_with_calls("", vec![call.clone()]),
            Turn::tool_result(&call, "3 transactions"),
        ];
        let tools = vec![ToolDefinition {
            name: "view_card_details".to_string(),
            description: "cards".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }];

        let json = serde_json::to_value(build_request(&messages, &tools, 0.0)).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are a banking assistant");
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(
            json["contents"][1]["parts"][0]["functionCall"]["name"],
            "list_recent_transactions"
        );
        assert_eq!(
            json["contents"][2]["parts"][0]["functionResponse"]["response"]["content"],
            "3 transactions"
        );
        assert!(json["tools"][0]["functionDeclarations"][0].get("parameters").is_none());
    }

    #[test]
    fn test_parse_function_call_response() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"functionCall": {"name": "view_card_details", "args": {}}}
                    ]
                },
                "finishReason": "STOP"
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();

        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "view_card_details");
        assert!(parsed.content.is_empty());
    }

    #[test]
    fn test_empty_candidates_is_an_error() {
        let response: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(parse_response(response).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash".to_string()).unwrap();
        let err = client.invoke(&[Turn::user("hi")], &[]).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("gemini_api_key"));
    }
}
