//! The tool-use loop: send history to the backend, run whatever tools
//! it asks for, fold the results back in, repeat. Iterative rather than
//! recursive so a long conversation can't grow the call stack, and
//! checks `stop_requested` at the head of every iteration so a caller
//! can cancel between turns without waiting for the whole loop to
//! finish on its own.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::backend::{BackendError, ChatBackend};
use crate::message::{AssistantTurn, Message, ToolResult, ToolSpec};
use crate::tools::{catalog, dispatch, ToolCall, ToolCallError, ToolContext};

const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Run the tool-use loop until the assistant stops requesting tools,
/// `stop_requested` is set, or `max_iterations` turns have elapsed.
/// Returns the full conversation history, the assistant's final turn,
/// and whether the loop was cut short by the iteration cap.
pub async fn run_tool_loop(
    backend: &impl ChatBackend,
    mut history: Vec<Message>,
    system_prompt: &str,
    ctx: &ToolContext<'_>,
    stop_requested: &AtomicBool,
) -> Result<(Vec<Message>, AssistantTurn), BackendError> {
    run_tool_loop_bounded(backend, &mut history, system_prompt, ctx, stop_requested, DEFAULT_MAX_ITERATIONS)
        .await
        .map(|turn| (history, turn))
}

async fn run_tool_loop_bounded(
    backend: &impl ChatBackend,
    history: &mut Vec<Message>,
    system_prompt: &str,
    ctx: &ToolContext<'_>,
    stop_requested: &AtomicBool,
    max_iterations: usize,
) -> Result<AssistantTurn, BackendError> {
    let tools = catalog();
    let mut last_turn = AssistantTurn::default();

    for iteration in 0..max_iterations {
        if stop_requested.load(Ordering::Acquire) {
            info!(iteration, "tool loop stopped by request");
            return Ok(last_turn);
        }

        let turn = run_single_turn(backend, history, system_prompt, ctx, &tools).await?;
        if turn.is_final() {
            return Ok(turn);
        }
        last_turn = turn;
    }

    info!(max_iterations, "tool loop hit iteration cap");
    Ok(last_turn)
}

/// Run exactly one backend turn against `history`: send it to the
/// backend, append the assistant's reply (with any tool calls it
/// requested), and if it did request tools, dispatch each in order and
/// append the results as the next user turn. `history` grows by one
/// message for a final turn, two otherwise. One call here is one
/// backend round trip, never more — callers that need to count actual
/// backend turns (the sound-matching loop) call this directly instead
/// of the bounded loop above.
pub async fn run_single_turn(
    backend: &impl ChatBackend,
    history: &mut Vec<Message>,
    system_prompt: &str,
    ctx: &ToolContext<'_>,
    tools: &[ToolSpec],
) -> Result<AssistantTurn, BackendError> {
    let turn = backend.chat(history, system_prompt, tools).await?;
    debug!(tool_uses = turn.tool_uses.len(), "assistant turn");

    history.push(Message::assistant_with_tool_calls(turn.text.clone(), turn.tool_uses.clone()));

    if turn.is_final() {
        return Ok(turn);
    }

    let mut results = Vec::with_capacity(turn.tool_uses.len());
    for request in &turn.tool_uses {
        let (content, is_error) = match ToolCall::try_from(request) {
            Ok(call) => dispatch(call, ctx).await,
            Err(ToolCallError::UnknownTool(name)) => (format!("unknown tool {name:?}"), true),
            Err(e @ ToolCallError::InvalidArguments { .. }) => (e.to_string(), true),
        };
        results.push(ToolResult {
            tool_use_id: request.id.clone(),
            content,
            is_error,
        });
    }

    let mut follow_up = Message::user(String::new());
    follow_up.tool_results = results;
    history.push(follow_up);
    Ok(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolUseRequest;
    use rk100s_device::DeviceSession;
    use rk100s_proto::registry::Registry;
    use rk100s_proto::sysex::Codec;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedBackend {
        turns: Vec<AssistantTurn>,
        calls: AtomicUsize,
    }

    impl ChatBackend for ScriptedBackend {
        async fn chat(
            &self,
            _history: &[Message],
            _system_prompt: &str,
            _tools: &[ToolSpec],
        ) -> Result<AssistantTurn, BackendError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.turns[i].clone())
        }
    }

    #[tokio::test]
    async fn loop_makes_exactly_one_call_when_first_turn_is_final() {
        let backend = ScriptedBackend {
            turns: vec![AssistantTurn { text: "done".to_string(), tool_uses: Vec::new() }],
            calls: AtomicUsize::new(0),
        };
        let registry = Registry::new();
        let device = DeviceSession::new(Codec::default(), 1);
        let ctx = ToolContext::new(&registry, &device, 1, 48_000);
        let stop = AtomicBool::new(false);

        let (history, turn) = run_tool_loop(&backend, vec![Message::user("hi")], "sys", &ctx, &stop)
            .await
            .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(turn.is_final());
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn loop_makes_a_second_call_after_one_tool_call() {
        let backend = ScriptedBackend {
            turns: vec![
                AssistantTurn {
                    text: String::new(),
                    tool_uses: vec![ToolUseRequest {
                        id: "call_1".to_string(),
                        name: "list_parameters".to_string(),
                        arguments: serde_json::json!({}),
                    }],
                },
                AssistantTurn { text: "done".to_string(), tool_uses: Vec::new() },
            ],
            calls: AtomicUsize::new(0),
        };
        let registry = Registry::new();
        let device = DeviceSession::new(Codec::default(), 1);
        let ctx = ToolContext::new(&registry, &device, 1, 48_000);
        let stop = AtomicBool::new(false);

        let (history, turn) = run_tool_loop(&backend, vec![Message::user("hi")], "sys", &ctx, &stop)
            .await
            .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(turn.is_final());
        assert_eq!(history.len(), 4);
    }
}
