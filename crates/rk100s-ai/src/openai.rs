//! OpenAI-compatible chat-completions backend (also serves Groq's
//! identical wire format per spec.md's `groq_api_key` config key):
//! tool calls arrive as `function` blocks with a JSON-encoded string
//! argument payload rather than Anthropic's structured `input`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::backend::{BackendError, ChatBackend};
use crate::message::{AssistantTurn, Message, Role, ToolSpec, ToolUseRequest};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiCompatBackend {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            client,
            api_key: api_key.into(),
            api_url: api_url.into(),
            model: model.into(),
        }
    }

    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(api_key, "https://api.groq.com/openai/v1/chat/completions", model)
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut>>,
}

#[derive(Serialize)]
struct WireToolCallOut {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolCallFunctionOut,
}

#[derive(Serialize)]
struct WireToolCallFunctionOut {
    name: String,
    /// Re-encoded as a JSON string, matching the convention this wire
    /// format expects on the way in (see `WireToolCallFunction`).
    arguments: String,
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct Choice {
    message: WireAssistantMessage,
}

#[derive(Deserialize)]
struct WireAssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireToolCallFunction,
}

#[derive(Deserialize)]
struct WireToolCallFunction {
    name: String,
    /// JSON-encoded string, not a nested object, per the function-call
    /// convention this wire format uses.
    arguments: String,
}

fn history_to_wire(history: &[Message]) -> Vec<WireMessage> {
    let mut out = Vec::new();
    for m in history {
        if m.tool_results.is_empty() {
            let tool_calls = if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|c| WireToolCallOut {
                            id: c.id.clone(),
                            kind: "function",
                            function: WireToolCallFunctionOut {
                                name: c.name.clone(),
                                arguments: c.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };
            out.push(WireMessage {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: Some(m.content.clone()),
                tool_call_id: None,
                tool_calls,
            });
        } else {
            for r in &m.tool_results {
                out.push(WireMessage {
                    role: "tool".to_string(),
                    content: Some(r.content.clone()),
                    tool_call_id: Some(r.tool_use_id.clone()),
                    tool_calls: None,
                });
            }
        }
    }
    out
}

impl ChatBackend for OpenAiCompatBackend {
    async fn chat(
        &self,
        history: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, BackendError> {
        let mut messages = vec![WireMessage {
            role: "system".to_string(),
            content: Some(system_prompt.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }];
        messages.extend(history_to_wire(history));

        let body = RequestBody {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages,
            tools: tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: ResponseBody = response
            .json()
            .await
            .map_err(|e| BackendError::UnparseableResponse(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(BackendError::Api(err.message));
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::UnparseableResponse("no choices in response".to_string()))?;

        let mut turn = AssistantTurn {
            text: choice.message.content.unwrap_or_default(),
            tool_uses: Vec::new(),
        };
        for call in choice.message.tool_calls {
            let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| BackendError::UnparseableResponse(e.to_string()))?;
            turn.tool_uses.push(ToolUseRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_to_wire_splits_tool_results_into_separate_messages() {
        let mut msg = Message::user("tool ran");
        msg.tool_results.push(crate::message::ToolResult {
            tool_use_id: "call_1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        });
        let wire = history_to_wire(&[msg]);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "tool");
        assert_eq!(wire[0].tool_call_id.as_deref(), Some("call_1"));
    }
}
