//! Gateway: the HTTP surface, wired onto the chat
//! pipeline, response writers, and service router.

use crate::backend::{GenerationParams, InferenceBackend};
use crate::config::GenerationConfig;
use crate::control::ActivityCounter;
use crate::error::GatewayError;
use crate::models::{
    ChatChoice, ChatCompletion, ChatMessageOut, ChatRequest, HealthResponse, Message, ModelEntry,
    ModelsResponse, OllamaChatRequest, OllamaGenerateRequest, ShowRequest, ShowResponse, TagDetails,
    TagEntry, TagsResponse, Usage,
};
use crate::pipeline::{self, PipelineInput};
use crate::router::{cors_layer, normalize_and_dispatch, CorsConfig};
use crate::service_router::{Resolution, ServiceRouter};
use crate::writer::{
    json_response, new_response_identity, NdjsonMode, NdjsonWriter, ResponseWriter, SseWriter,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

/// Shared state for every handler. Cheap to clone: everything inside is already
/// behind an `Arc` or is itself small.
#[derive(Clone)]
pub struct GatewayState {
    pub backend: Arc<dyn InferenceBackend>,
    pub installed_models: Vec<String>,
    pub system_default_available: bool,
    pub activity: Arc<ActivityCounter>,
    pub generation: GenerationConfig,
}

impl GatewayState {
    fn service_router(&self) -> ServiceRouter {
        ServiceRouter::new(self.system_default_available, self.installed_models.clone())
    }
}

/// Builds the full `axum::Router`, with prefix-normalization and CORS applied as
/// the outer layers.
pub fn build_router(state: GatewayState, cors: CorsConfig) -> Router {
    let inner = Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .route("/models", get(models_handler))
        .route("/tags", get(tags_handler))
        .route("/show", post(show_handler))
        .route("/chat/completions", post(chat_completions_handler))
        .route("/chat", post(ollama_chat_handler))
        .route("/generate", post(ollama_generate_handler))
        .fallback(not_found_handler)
        .with_state(state);

    Router::new()
        .merge(inner)
        .layer(middleware::from_fn_with_state(
            Arc::new(cors),
            cors_layer,
        ))
        .layer(middleware::from_fn(normalize_and_dispatch))
}

async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        active_generations: state.activity.total(),
    })
}

async fn root_handler() -> impl IntoResponse {
    "osaurus — local chat-completions gateway\n"
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

async fn models_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let data = state
        .installed_models
        .iter()
        .map(|id| ModelEntry {
            id: id.clone(),
            object: "model",
        })
        .collect();
    Json(ModelsResponse { data })
}

async fn tags_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let models = state
        .installed_models
        .iter()
        .map(|id| {
            let tagged = if id.contains(':') {
                id.clone()
            } else {
                format!("{id}:latest")
            };
            TagEntry {
                name: tagged.clone(),
                model: tagged,
                modified_at: chrono::Utc::now().to_rfc3339(),
                size: 0,
                digest: String::new(),
                details: TagDetails::default(),
            }
        })
        .collect();
    Json(TagsResponse { models })
}

async fn show_handler(
    State(state): State<GatewayState>,
    body: Result<Json<ShowRequest>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(req) = body?;
    let resolution = state.service_router().resolve(&req.model);
    match resolution {
        Resolution::None => Err(GatewayError::UnknownModel(req.model)),
        Resolution::Service { effective_model, .. } => Ok(Json(ShowResponse {
            modelfile: format!("# generated for {effective_model}"),
            parameters: String::new(),
            template: String::new(),
            details: TagDetails::default(),
            capabilities: vec!["completion"],
        })),
    }
}

fn generation_params(
    generation: &GenerationConfig,
    temperature: f32,
    max_tokens: u32,
    top_p_override: Option<f32>,
    session_id: Option<String>,
) -> GenerationParams {
    GenerationParams {
        temperature,
        max_tokens,
        top_p: top_p_override.or(Some(generation.top_p)),
        kv_bits: generation.kv_bits,
        kv_group: Some(generation.kv_group_size),
        quantized_kv_start: Some(generation.quantized_kv_start),
        max_kv_size: generation.max_kv_size,
        prefill_step_size: Some(generation.prefill_step_size),
        session_id,
    }
}

async fn chat_completions_handler(
    State(state): State<GatewayState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(req) = body?;
    if req.messages.is_empty() {
        return Err(GatewayError::InvalidRequest("messages must not be empty".to_string()));
    }

    state.activity.mark_generation_start();
    let resolution = state.service_router().resolve(&req.model);
    let Resolution::Service { effective_model, .. } = resolution else {
        return Err(GatewayError::NoServiceAvailable(req.model));
    };

    let stops = req.effective_stops();
    let tool_choice_disables_probe = matches!(
        &req.tool_choice,
        Some(crate::models::ToolChoice::Mode(m)) if m == "none"
    );
    let probe_enabled = req.active_tools().is_some() && !tool_choice_disables_probe;
    let params = generation_params(
        &state.generation,
        req.temperature(),
        req.max_tokens(),
        req.top_p,
        req.session_id.clone(),
    );

    if req.wants_stream() {
        let (mut writer, response) = SseWriter::channel();
        let backend = state.backend.clone();
        let messages = req.messages.clone();
        let tools = req.tools.clone();
        let tool_choice = req.tool_choice.clone();
        let model = effective_model;
        tokio::spawn(async move {
            let (id, created) = new_response_identity();
            let input = PipelineInput {
                messages: &messages,
                tools: tools.as_deref(),
                tool_choice: tool_choice.as_ref(),
                params,
                stops,
                probe_enabled,
            };
            if let Err(e) = pipeline::run_streaming(&mut writer, &model, &id, created, backend.as_ref(), input).await
            {
                log::warn!("streaming generation failed: {}", e);
                writer.write_finish(&model, &id, created, "stop");
                writer.write_end();
            }
        });
        return Ok(response);
    }

    let input = PipelineInput {
        messages: &req.messages,
        tools: req.active_tools(),
        tool_choice: req.tool_choice.as_ref(),
        params,
        stops,
        probe_enabled,
    };
    let outcome = pipeline::run_once(state.backend.as_ref(), &input).await?;
    let (id, created) = new_response_identity();
    let prompt_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
    let completion_chars = outcome.result.text.as_deref().map(str::len).unwrap_or(0);
    let usage = match (outcome.result.prompt_tokens, outcome.result.completion_tokens) {
        (Some(p), Some(c)) => Usage {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: p + c,
        },
        _ => Usage::approximate(prompt_chars, completion_chars),
    };
    let message = ChatMessageOut {
        role: "assistant",
        content: outcome.result.text,
        tool_calls: outcome.result.tool_call.map(|tc| vec![tc]),
    };
    let body = ChatCompletion {
        id,
        object: "chat.completion",
        created,
        model: effective_model,
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason: outcome.finish_reason,
        }],
        usage,
    };
    Ok(json_response(StatusCode::OK, &body))
}

async fn ollama_chat_handler(
    State(state): State<GatewayState>,
    body: Result<Json<OllamaChatRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(req) = body?;
    if req.messages.is_empty() {
        return Err(GatewayError::InvalidRequest("messages must not be empty".to_string()));
    }
    state.activity.mark_generation_start();
    let resolution = state.service_router().resolve(&req.model);
    let Resolution::Service { effective_model, .. } = resolution else {
        return Err(GatewayError::NoServiceAvailable(req.model));
    };

    let (mut writer, response) = NdjsonWriter::channel(NdjsonMode::Chat);
    let backend = state.backend.clone();
    let generation = state.generation.clone();
    let messages = req.messages;
    tokio::spawn(async move {
        let (id, created) = new_response_identity();
        let input = PipelineInput {
            messages: &messages,
            tools: None,
            tool_choice: None,
            params: generation_params(&generation, 0.7, 2048, None, None),
            stops: vec![],
            probe_enabled: false,
        };
        if let Err(e) =
            pipeline::run_streaming(&mut writer, &effective_model, &id, created, backend.as_ref(), input).await
        {
            log::warn!("ollama chat generation failed: {}", e);
            writer.write_end();
        }
    });
    Ok(response)
}

async fn ollama_generate_handler(
    State(state): State<GatewayState>,
    body: Result<Json<OllamaGenerateRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(req) = body?;
    state.activity.mark_generation_start();
    let resolution = state.service_router().resolve(&req.model);
    let Resolution::Service { effective_model, .. } = resolution else {
        return Err(GatewayError::NoServiceAvailable(req.model));
    };

    let (mut writer, response) = NdjsonWriter::channel(NdjsonMode::Generate);
    let backend = state.backend.clone();
    let generation = state.generation.clone();
    let messages = vec![Message {
        role: "user".to_string(),
        content: req.prompt,
        tool_calls: None,
        tool_call_id: None,
    }];
    tokio::spawn(async move {
        let (id, created) = new_response_identity();
        let input = PipelineInput {
            messages: &messages,
            tools: None,
            tool_choice: None,
            params: generation_params(&generation, 0.7, 2048, None, None),
            stops: vec![],
            probe_enabled: false,
        };
        if let Err(e) =
            pipeline::run_streaming(&mut writer, &effective_model, &id, created, backend.as_ref(), input).await
        {
            log::warn!("ollama generate failed: {}", e);
            writer.write_end();
        }
    });
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EchoBackend;

    fn test_state() -> GatewayState {
        GatewayState {
            backend: Arc::new(EchoBackend::new(vec!["hi".to_string()])),
            installed_models: vec!["m".to_string()],
            system_default_available: false,
            activity: Arc::new(ActivityCounter::new()),
            generation: GenerationConfig::default(),
        }
    }

    #[test]
    fn router_builds_without_panicking() {
        let _router = build_router(test_state(), CorsConfig::default());
    }

    #[test]
    fn generation_params_carries_config_knobs() {
        let mut generation = GenerationConfig::default();
        generation.kv_bits = Some(4);
        generation.kv_group_size = 32;
        generation.quantized_kv_start = 128;
        generation.max_kv_size = Some(4096);
        generation.prefill_step_size = 256;

        let params = generation_params(&generation, 0.5, 1024, None, None);
        assert_eq!(params.top_p, Some(generation.top_p));
        assert_eq!(params.kv_bits, Some(4));
        assert_eq!(params.kv_group, Some(32));
        assert_eq!(params.quantized_kv_start, Some(128));
        assert_eq!(params.max_kv_size, Some(4096));
        assert_eq!(params.prefill_step_size, Some(256));
    }

    #[test]
    fn generation_params_request_top_p_overrides_config_default() {
        let generation = GenerationConfig::default();
        let params = generation_params(&generation, 0.5, 1024, Some(0.3), None);
        assert_eq!(params.top_p, Some(0.3));
    }
}
