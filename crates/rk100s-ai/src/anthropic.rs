//! Anthropic Messages API backend: native tool-use blocks.
//!
//! Grounded in the pack's only concrete async-JSON-over-HTTP client,
//! `rk100s_device`'s sibling-crate cousin `ConsulDiscovery`
//! (`examples/hdds-team-hdds/.../consul.rs`): a `reqwest::Client` built
//! once with a timeout, `.json(&body).send().await`, then
//! `response.json().await` into a typed struct.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::backend::{BackendError, ChatBackend};
use crate::message::{AssistantTurn, Message, Role, ToolSpec, ToolUseRequest};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    pub fn with_model(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn api_url(&self) -> &str {
        API_URL
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ResponseBody {
    content: Vec<ContentBlock>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

fn history_to_wire(history: &[Message]) -> Vec<WireMessage> {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let content = if !m.tool_calls.is_empty() {
                let mut blocks = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": m.content}));
                }
                for call in &m.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                json!(blocks)
            } else if !m.tool_results.is_empty() {
                json!(m
                    .tool_results
                    .iter()
                    .map(|r| json!({
                        "type": "tool_result",
                        "tool_use_id": r.tool_use_id,
                        "content": r.content,
                        "is_error": r.is_error,
                    }))
                    .collect::<Vec<_>>())
            } else {
                json!(m.content)
            };
            WireMessage {
                role: role.to_string(),
                content,
            }
        })
        .collect()
}

impl ChatBackend for AnthropicBackend {
    async fn chat(
        &self,
        history: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, BackendError> {
        let body = RequestBody {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            system: system_prompt,
            messages: history_to_wire(history),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.api_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let mut turn = AssistantTurn::default();
        for block in parsed.content {
            match block {
                ContentBlock::Text { text } => turn.text.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    turn.tool_uses.push(ToolUseRequest {
                        id,
                        name,
                        arguments: input,
                    });
                }
            }
        }
        Ok(turn)
    }
}
