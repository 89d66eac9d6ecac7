//! Osaurus core — the HTTP streaming gateway for local chat-completion serving.
//!
//! Serves OpenAI-compatible and Ollama-compatible chat endpoints over SSE and
//! NDJSON, with server-side tool-call streaming, micro-batching, and an
//! actor-owned server lifecycle. The model runtime behind `backend::InferenceBackend`
//! is an external collaborator; this crate never touches weights or tokenizers.

pub mod backend;
pub mod config;
pub mod control;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod init;
pub mod lifecycle;
pub mod microbatch;
pub mod models;
pub mod pipeline;
pub mod router;
pub mod service_router;
pub mod stop;
pub mod toolcall;
pub mod writer;
