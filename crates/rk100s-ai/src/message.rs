//! Backend-agnostic conversation and tool-use types. Both the
//! Anthropic-shaped and OpenAI-compatible backends translate their own
//! wire formats into these before handing a turn back to the driver.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool calls the assistant requested in this turn, so a later
    /// turn's `tool_results` can be replayed against a backend that
    /// requires every referenced call id to have been declared first.
    #[serde(default)]
    pub tool_calls: Vec<ToolUseRequest>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolUseRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_results: Vec::new(),
        }
    }
}

/// A JSON-Schema-shaped tool description handed to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A single tool invocation requested by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of running a [`ToolUseRequest`], fed back as the next
/// user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// One backend response: free text plus zero or more tool calls to run
/// before the next turn.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub text: String,
    pub tool_uses: Vec<ToolUseRequest>,
}

impl AssistantTurn {
    pub fn is_final(&self) -> bool {
        self.tool_uses.is_empty()
    }
}
