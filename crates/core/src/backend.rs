//! The Inference Backend interface. The core consumes exactly this contract;
//! the model runtime behind it is an external collaborator and out of scope here.

use crate::error::BackendError;
use crate::models::{Message, Tool, ToolCall, ToolCallFunction, ToolChoice};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// One event in the stream a backend yields. Exactly one field is set per event.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Chunk(String),
    ToolCall(ToolCall),
}

/// Generation parameters forwarded to the backend.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    pub kv_bits: Option<u32>,
    pub kv_group: Option<u32>,
    pub quantized_kv_start: Option<u32>,
    pub max_kv_size: Option<u32>,
    pub prefill_step_size: Option<u32>,
    /// Forwarded verbatim, never interpreted or persisted.
    pub session_id: Option<String>,
}

/// Result of a single non-streaming generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub text: Option<String>,
    pub tool_call: Option<ToolCall>,
    /// Set when the backend signals the output was truncated by `max_tokens`.
    pub truncated: bool,
    /// Backend-reported token counts, when available.
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// The contract the chat pipeline consumes from a model runtime.
///
/// Implementations must honor cancellation: once the caller stops polling the
/// stream returned by `stream_events`, any outstanding backend work must be released.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn stream_events(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        tool_choice: Option<&ToolChoice>,
        params: &GenerationParams,
    ) -> Result<BoxStream<'static, GenerationEvent>, BackendError>;

    async fn generate_once(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        tool_choice: Option<&ToolChoice>,
        params: &GenerationParams,
    ) -> Result<GenerationResult, BackendError>;
}

/// A deterministic test double that replays a configured chunk/tool-call sequence.
/// Used by integration tests and examples; never a real inference path.
pub struct EchoBackend {
    chunks: Vec<String>,
    tool_call: Option<ToolCallFunction>,
}

impl EchoBackend {
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            tool_call: None,
        }
    }

    pub fn with_tool_call(chunks: Vec<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            chunks,
            tool_call: Some(ToolCallFunction {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }
}

#[async_trait]
impl InferenceBackend for EchoBackend {
    async fn stream_events(
        &self,
        _messages: &[Message],
        _tools: Option<&[Tool]>,
        _tool_choice: Option<&ToolChoice>,
        _params: &GenerationParams,
    ) -> Result<BoxStream<'static, GenerationEvent>, BackendError> {
        use futures_util::StreamExt;

        let mut events: Vec<GenerationEvent> = self
            .chunks
            .iter()
            .cloned()
            .map(GenerationEvent::Chunk)
            .collect();
        if let Some(function) = &self.tool_call {
            events.push(GenerationEvent::ToolCall(ToolCall {
                id: crate::ids::tool_call_id(),
                typ: "function".to_string(),
                function: function.clone(),
            }));
        }
        Ok(futures_util::stream::iter(events).boxed())
    }

    async fn generate_once(
        &self,
        _messages: &[Message],
        _tools: Option<&[Tool]>,
        _tool_choice: Option<&ToolChoice>,
        _params: &GenerationParams,
    ) -> Result<GenerationResult, BackendError> {
        if let Some(function) = &self.tool_call {
            return Ok(GenerationResult {
                tool_call: Some(ToolCall {
                    id: crate::ids::tool_call_id(),
                    typ: "function".to_string(),
                    function: function.clone(),
                }),
                ..Default::default()
            });
        }
        let text = self.chunks.concat();
        let completion_tokens = (text.len() / 4) as u32;
        Ok(GenerationResult {
            text: Some(text),
            truncated: false,
            completion_tokens: Some(completion_tokens),
            ..Default::default()
        })
    }
}
