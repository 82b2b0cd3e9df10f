//! The backend-agnostic chat contract, and both concrete
//! implementations reqwest talks to.

use std::future::Future;

use thiserror::Error;

use crate::message::{AssistantTurn, Message, ToolSpec};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned an unparseable response: {0}")]
    UnparseableResponse(String),
    #[error("backend returned an error: {0}")]
    Api(String),
}

/// A chat completion provider capable of native or emulated tool use.
/// Implementations never see this crate's tool catalog directly — they
/// only shuttle [`ToolSpec`]/[`ToolUseRequest`] across the wire.
pub trait ChatBackend: Send + Sync {
    fn chat(
        &self,
        history: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
    ) -> impl Future<Output = Result<AssistantTurn, BackendError>> + Send;
}

/// A runtime-selected backend. `ChatBackend`'s `impl Future` return
/// isn't dyn-compatible, so runtime selection (config-driven, as
/// `rk100s-cli` needs) goes through this closed enum and a `match`
/// instead of a trait object.
pub enum AnyBackend {
    Anthropic(crate::anthropic::AnthropicBackend),
    OpenAiCompat(crate::openai::OpenAiCompatBackend),
}

impl ChatBackend for AnyBackend {
    async fn chat(
        &self,
        history: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, BackendError> {
        match self {
            AnyBackend::Anthropic(b) => b.chat(history, system_prompt, tools).await,
            AnyBackend::OpenAiCompat(b) => b.chat(history, system_prompt, tools).await,
        }
    }
}
