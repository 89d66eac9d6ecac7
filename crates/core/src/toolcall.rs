//! Tool-call stream translator: converts one backend tool-call event
//! into the wire-level delta sequence for SSE, or a final response object for
//! non-streaming. Modeled as a three-state machine; `EmittingToolCall` is terminal.

use crate::models::{ChunkDelta, ToolCall, ToolCallDelta, ToolCallFunctionDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorState {
    WaitingForFirstEvent,
    StreamingContent,
    EmittingToolCall,
}

/// Tracks which state a single response's tool-call translation is in. The pipeline
/// advances this machine as it runs the stream loop.
pub struct ToolCallTranslator {
    state: TranslatorState,
}

impl Default for ToolCallTranslator {
    fn default() -> Self {
        Self {
            state: TranslatorState::WaitingForFirstEvent,
        }
    }
}

impl ToolCallTranslator {
    pub fn state(&self) -> TranslatorState {
        self.state
    }

    /// Call once the role prelude (or first content) has been written.
    pub fn on_content_started(&mut self) {
        if self.state == TranslatorState::WaitingForFirstEvent {
            self.state = TranslatorState::StreamingContent;
        }
    }

    /// Call when a tool call arrives. Terminal: no further content may follow.
    pub fn on_tool_call(&mut self) {
        self.state = TranslatorState::EmittingToolCall;
    }
}

/// The four SSE deltas emitted, in order, for one tool call. The index is
/// always 0: the core emits at most one tool call per response.
pub fn tool_call_deltas(tool_call: &ToolCall) -> [ChunkDelta; 3] {
    [
        ChunkDelta {
            role: None,
            content: None,
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: Some(tool_call.id.clone()),
                typ: Some("function"),
                function: None,
            }]),
        },
        ChunkDelta {
            role: None,
            content: None,
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: None,
                typ: None,
                function: Some(ToolCallFunctionDelta {
                    name: Some(tool_call.function.name.clone()),
                    arguments: None,
                }),
            }]),
        },
        ChunkDelta {
            role: None,
            content: None,
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: None,
                typ: None,
                function: Some(ToolCallFunctionDelta {
                    name: None,
                    arguments: Some(tool_call.function.arguments.clone()),
                }),
            }]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolCallFunction;

    #[test]
    fn state_machine_transitions_to_terminal() {
        let mut t = ToolCallTranslator::default();
        assert_eq!(t.state(), TranslatorState::WaitingForFirstEvent);
        t.on_content_started();
        assert_eq!(t.state(), TranslatorState::StreamingContent);
        t.on_tool_call();
        assert_eq!(t.state(), TranslatorState::EmittingToolCall);
    }

    #[test]
    fn tool_call_deltas_carry_id_name_arguments_in_order() {
        let tc = ToolCall {
            id: "call_abcdefgh".to_string(),
            typ: "function".to_string(),
            function: ToolCallFunction {
                name: "lookup".to_string(),
                arguments: "{\"q\":\"x\"}".to_string(),
            },
        };
        let deltas = tool_call_deltas(&tc);
        assert_eq!(
            deltas[0].tool_calls.as_ref().unwrap()[0].id.as_deref(),
            Some("call_abcdefgh")
        );
        assert_eq!(
            deltas[1].tool_calls.as_ref().unwrap()[0]
                .function
                .as_ref()
                .unwrap()
                .name
                .as_deref(),
            Some("lookup")
        );
        assert_eq!(
            deltas[2].tool_calls.as_ref().unwrap()[0]
                .function
                .as_ref()
                .unwrap()
                .arguments
                .as_deref(),
            Some("{\"q\":\"x\"}")
        );
    }
}
