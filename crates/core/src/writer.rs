//! Response writers: SSE and NDJSON share a five-operation contract; a
//! third, one-shot JSON writer serves non-streaming responses. Handlers dispatch
//! through the trait rather than branching on content-type in request handling.

use crate::ids;
use crate::models::{ChatCompletionChunk, ChunkChoice, ChunkDelta, ToolCall};
use crate::toolcall::tool_call_deltas;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The five operations a streaming response writer implements. `write_headers`
/// is implicit in each writer's response-construction step, since axum commits
/// headers at the point the `Response` is returned from the handler.
pub trait ResponseWriter: Send {
    fn write_role(&mut self, model: &str, id: &str, created: i64);
    fn write_content(&mut self, text: &str, model: &str, id: &str, created: i64);
    /// Terminal for the response: no content may be written afterward.
    fn write_tool_call(&mut self, tool_call: &ToolCall, model: &str, id: &str, created: i64);
    fn write_finish(&mut self, model: &str, id: &str, created: i64, finish_reason: &'static str);
    fn write_end(&mut self);
}

/// SSE writer for the OpenAI streaming path. Frames each record as `data: <json>\n\n`
/// and terminates with `data: [DONE]\n\n`.
pub struct SseWriter {
    tx: mpsc::UnboundedSender<Event>,
    closed: bool,
}

impl SseWriter {
    /// Builds a writer plus the `Response` its channel backs. The response can be
    /// returned from the handler immediately; frames arrive as the pipeline writes them.
    pub fn channel() -> (Self, Response) {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();
        let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
        let mut response = Sse::new(stream).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        (
            Self {
                tx,
                closed: false,
            },
            response,
        )
    }

    fn send_chunk(&mut self, choice: ChunkChoice, model: &str, id: &str, created: i64) {
        if self.closed {
            return;
        }
        let chunk = ChatCompletionChunk {
            id: id.to_string(),
            object: "chat.completion.chunk",
            created,
            model: model.to_string(),
            choices: vec![choice],
        };
        let body = serde_json::to_string(&chunk).unwrap_or_default();
        let _ = self.tx.send(Event::default().data(body));
    }
}

impl ResponseWriter for SseWriter {
    fn write_role(&mut self, model: &str, id: &str, created: i64) {
        self.send_chunk(
            ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some("assistant"),
                    content: None,
                    tool_calls: None,
                },
                finish_reason: None,
            },
            model,
            id,
            created,
        );
    }

    fn write_content(&mut self, text: &str, model: &str, id: &str, created: i64) {
        if text.is_empty() {
            return;
        }
        self.send_chunk(
            ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(text.to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            },
            model,
            id,
            created,
        );
    }

    fn write_tool_call(&mut self, tool_call: &ToolCall, model: &str, id: &str, created: i64) {
        for delta in tool_call_deltas(tool_call) {
            self.send_chunk(
                ChunkChoice {
                    index: 0,
                    delta,
                    finish_reason: None,
                },
                model,
                id,
                created,
            );
        }
    }

    fn write_finish(&mut self, model: &str, id: &str, created: i64, finish_reason: &'static str) {
        self.send_chunk(
            ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: Some(finish_reason),
            },
            model,
            id,
            created,
        );
    }

    fn write_end(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.tx.send(Event::default().data("[DONE]"));
    }
}

/// Which Ollama route an `NdjsonWriter` is framing content lines for. `/chat`
/// wraps each chunk in `{message:{role,content}}`; `/generate` wraps it in
/// `{response:<chunk>}` — the two routes' NDJSON line shapes are not interchangeable.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum NdjsonMode {
    Chat,
    Generate,
}

/// NDJSON writer for the Ollama streaming paths. Omits role preludes entirely,
/// frames content per `mode`, terminates with `{done:true}\n`.
/// Tool calls are not representable on this path — the
/// translator simply flushes pending text and terminates.
pub struct NdjsonWriter {
    tx: mpsc::UnboundedSender<Bytes>,
    closed: bool,
    mode: NdjsonMode,
}

impl NdjsonWriter {
    pub fn channel(mode: NdjsonMode) -> (Self, Response) {
        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
        let body = Body::from_stream(stream);
        let mut response = Response::new(body);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-ndjson"),
        );
        (
            Self {
                tx,
                closed: false,
                mode,
            },
            response,
        )
    }

    fn send_line(&mut self, value: serde_json::Value) {
        if self.closed {
            return;
        }
        let mut line = serde_json::to_vec(&value).unwrap_or_default();
        line.push(b'\n');
        let _ = self.tx.send(Bytes::from(line));
    }
}

impl ResponseWriter for NdjsonWriter {
    fn write_role(&mut self, _model: &str, _id: &str, _created: i64) {
        // No-op: NDJSON carries no role prelude.
    }

    fn write_content(&mut self, text: &str, _model: &str, _id: &str, _created: i64) {
        if text.is_empty() {
            return;
        }
        let line = match self.mode {
            NdjsonMode::Chat => serde_json::json!({
                "message": { "role": "assistant", "content": text }
            }),
            NdjsonMode::Generate => serde_json::json!({ "response": text }),
        };
        self.send_line(line);
    }

    fn write_tool_call(&mut self, _tool_call: &ToolCall, _model: &str, _id: &str, _created: i64) {
        // Not supported on NDJSON: callers flush pending text and call write_end.
    }

    fn write_finish(&mut self, _model: &str, _id: &str, _created: i64, _finish_reason: &'static str) {
        // NDJSON has no separate finish record; `write_end` carries `done:true`.
    }

    fn write_end(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.send_line(serde_json::json!({ "done": true }));
    }
}

/// One-shot JSON writer for non-streaming responses.
pub fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response {
    let payload = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

/// Builds a fresh `id`/`created` pair for a response.
pub fn new_response_identity() -> (String, i64) {
    (ids::completion_id(), ids::unix_seconds())
}
