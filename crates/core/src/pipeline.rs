//! Chat pipeline: turns a decoded request into a stream of writer calls.
//! Shared between the OpenAI and Ollama paths; only the writer differs.

use crate::backend::{GenerationEvent, GenerationParams, GenerationResult, InferenceBackend};
use crate::error::BackendError;
use crate::microbatch::MicroBatcher;
use crate::models::{Message, Tool, ToolChoice};
use crate::stop::StopTail;
use crate::toolcall::{ToolCallTranslator, TranslatorState};
use crate::writer::ResponseWriter;
use futures_util::StreamExt;
use tokio::time::Instant;

pub const DEFAULT_PROBE_TOKENS: usize = 12;
pub const DEFAULT_PROBE_BYTES: usize = 2048;

pub fn probe_tokens_from_env() -> usize {
    std::env::var("OSU_TOOL_PROBE_TOKENS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_PROBE_TOKENS)
}

pub fn probe_bytes_from_env() -> usize {
    std::env::var("OSU_TOOL_PROBE_BYTES")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_PROBE_BYTES)
}

/// Everything the pipeline needs to drive one request, independent of the writer.
pub struct PipelineInput<'a> {
    pub messages: &'a [Message],
    pub tools: Option<&'a [Tool]>,
    pub tool_choice: Option<&'a ToolChoice>,
    pub params: GenerationParams,
    pub stops: Vec<String>,
    /// Probe-then-stream is used only when tools are active and not disabled.
    pub probe_enabled: bool,
}

/// Runs the streaming path against `writer`, driving `backend`.
/// Returns once the role prelude, zero or more content deltas, the finish delta
/// (or the tool-call sequence), and the terminal marker have all been written.
pub async fn run_streaming(
    writer: &mut dyn ResponseWriter,
    model: &str,
    id: &str,
    created: i64,
    backend: &dyn InferenceBackend,
    input: PipelineInput<'_>,
) -> Result<(), BackendError> {
    writer.write_role(model, id, created);
    let mut translator = ToolCallTranslator::default();
    translator.on_content_started();

    let mut stream = backend
        .stream_events(input.messages, input.tools, input.tool_choice, &input.params)
        .await?;

    let mut stop_tail = StopTail::new(input.stops);
    let mut batcher = MicroBatcher::from_env();

    if input.probe_enabled {
        run_probe_then_stream(
            writer, model, id, created, &mut stream, &mut stop_tail, &mut batcher, &mut translator,
        )
        .await;
    } else {
        run_free_streaming(
            writer, model, id, created, &mut stream, &mut stop_tail, &mut batcher, &mut translator,
        )
        .await;
    }

    Ok(())
}

async fn run_free_streaming(
    writer: &mut dyn ResponseWriter,
    model: &str,
    id: &str,
    created: i64,
    stream: &mut futures_util::stream::BoxStream<'static, GenerationEvent>,
    stop_tail: &mut StopTail,
    batcher: &mut MicroBatcher,
    translator: &mut ToolCallTranslator,
) {
    let mut timer = Box::pin(tokio::time::sleep(batcher.interval()));

    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event else { break };
                match event {
                    GenerationEvent::ToolCall(_) => {
                        // No tools were offered on this path; a backend that emits one anyway
                        // is treated as if it had emitted no further content.
                        translator.on_tool_call();
                        break;
                    }
                    GenerationEvent::Chunk(chunk) => {
                        debug_assert_ne!(translator.state(), TranslatorState::EmittingToolCall);
                        let outcome = stop_tail.append_and_check(&chunk);
                        if let Some(flushed) = batcher.push(&outcome.keep) {
                            writer.write_content(&flushed, model, id, created);
                            timer.as_mut().reset(Instant::now() + batcher.interval());
                        }
                        if outcome.matched.is_some() {
                            break;
                        }
                    }
                }
            }
            _ = &mut timer => {
                if let Some(flushed) = batcher.take_pending() {
                    writer.write_content(&flushed, model, id, created);
                }
                timer.as_mut().reset(Instant::now() + batcher.interval());
            }
        }
    }

    if translator.state() == TranslatorState::EmittingToolCall {
        writer.write_end();
        return;
    }

    if let Some(remaining) = batcher.take_pending() {
        writer.write_content(&remaining, model, id, created);
    }
    writer.write_finish(model, id, created, "stop");
    writer.write_end();
}

async fn run_probe_then_stream(
    writer: &mut dyn ResponseWriter,
    model: &str,
    id: &str,
    created: i64,
    stream: &mut futures_util::stream::BoxStream<'static, GenerationEvent>,
    stop_tail: &mut StopTail,
    batcher: &mut MicroBatcher,
    translator: &mut ToolCallTranslator,
) {
    let probe_tokens = probe_tokens_from_env();
    let probe_bytes = probe_bytes_from_env();

    let mut probe_buffer = String::new();
    let mut token_count = 0usize;
    let mut transitioned = false;
    let mut timer = Box::pin(tokio::time::sleep(batcher.interval()));

    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event else { break };
                match event {
                    GenerationEvent::ToolCall(tool_call) => {
                        // Probe buffer is discarded entirely: no content ever reached the wire.
                        translator.on_tool_call();
                        debug_assert_eq!(translator.state(), TranslatorState::EmittingToolCall);
                        writer.write_tool_call(&tool_call, model, id, created);
                        writer.write_finish(model, id, created, "tool_calls");
                        writer.write_end();
                        return;
                    }
                    GenerationEvent::Chunk(chunk) => {
                        debug_assert_ne!(translator.state(), TranslatorState::EmittingToolCall);
                        if !transitioned {
                            probe_buffer.push_str(&chunk);
                            token_count += 1;
                            if token_count >= probe_tokens || probe_buffer.len() >= probe_bytes {
                                transitioned = true;
                                let outcome = stop_tail.append_and_check(&probe_buffer);
                                if !outcome.keep.is_empty() {
                                    if let Some(flushed) = batcher.push(&outcome.keep) {
                                        writer.write_content(&flushed, model, id, created);
                                        timer.as_mut().reset(Instant::now() + batcher.interval());
                                    }
                                }
                                if outcome.matched.is_some() {
                                    break;
                                }
                            }
                        } else {
                            let outcome = stop_tail.append_and_check(&chunk);
                            if let Some(flushed) = batcher.push(&outcome.keep) {
                                writer.write_content(&flushed, model, id, created);
                                timer.as_mut().reset(Instant::now() + batcher.interval());
                            }
                            if outcome.matched.is_some() {
                                break;
                            }
                        }
                    }
                }
            }
            _ = &mut timer => {
                if transitioned {
                    if let Some(flushed) = batcher.take_pending() {
                        writer.write_content(&flushed, model, id, created);
                    }
                }
                timer.as_mut().reset(Instant::now() + batcher.interval());
            }
        }
    }

    if !transitioned && !probe_buffer.is_empty() {
        let outcome = stop_tail.append_and_check(&probe_buffer);
        if let Some(flushed) = batcher.push(&outcome.keep) {
            writer.write_content(&flushed, model, id, created);
        }
    }

    if let Some(remaining) = batcher.take_pending() {
        writer.write_content(&remaining, model, id, created);
    }
    writer.write_finish(model, id, created, "stop");
    writer.write_end();
}

/// Non-streaming path: a single `generate_once` call, stop-trimmed.
pub struct NonStreamingOutcome {
    pub result: GenerationResult,
    pub finish_reason: &'static str,
}

pub async fn run_once(
    backend: &dyn InferenceBackend,
    input: &PipelineInput<'_>,
) -> Result<NonStreamingOutcome, BackendError> {
    let result = backend
        .generate_once(input.messages, input.tools, input.tool_choice, &input.params)
        .await?;

    if result.tool_call.is_some() {
        return Ok(NonStreamingOutcome {
            result,
            finish_reason: "tool_calls",
        });
    }

    let mut trimmed = result;
    if let Some(text) = &trimmed.text {
        let mut stop_tail = StopTail::new(input.stops.clone());
        let outcome = stop_tail.append_and_check(text);
        trimmed.text = Some(outcome.keep);
    }

    let finish_reason = if trimmed.truncated { "length" } else { "stop" };
    Ok(NonStreamingOutcome {
        result: trimmed,
        finish_reason,
    })
}
