//! Backend-agnostic AI tool-use driver for the RK-100S 2: a chat
//! contract two different providers implement, a fixed 7-tool catalog,
//! an iterative tool-use loop, and a sound-matching orchestrator built
//! on top of it.

pub mod anthropic;
pub mod audio;
pub mod backend;
pub mod driver;
pub mod match_sound;
pub mod message;
pub mod openai;
pub mod tools;

pub use anthropic::AnthropicBackend;
pub use backend::{AnyBackend, BackendError, ChatBackend};
pub use driver::{run_single_turn, run_tool_loop};
pub use match_sound::{match_sound, MatchSoundOutcome};
pub use message::{AssistantTurn, Message, Role, ToolResult, ToolSpec, ToolUseRequest};
pub use openai::OpenAiCompatBackend;
pub use tools::{catalog, dispatch, ToolCall, ToolCallError, ToolContext};
