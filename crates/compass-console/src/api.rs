// /src/api.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;

use compass_client::ParserConfig;
use compass_core::{normalize, registry, BackendRole, RelayError, RetryPolicy, Target};
use console_assets::AssetBank;
use llm_traits::{ChatDocument, ChatMessage, ChatRequest};

use crate::{
    backend::{Backends, Effective},
    extract::{JsonAnyEncoding, JsonReply},
    model::{
        ApiCallRequest, ChatFailure, ChatGenerateRequest, ChatGenerateResponse, IndexChatRequest,
        ModelSummary, ModelsQuery,
    },
};

/// Hits handed to the chat model as grounding documents.
pub const CHAT_TOP_K: usize = 5;

pub struct AppState<B> {
    pub backends: Arc<B>,
    pub assets: AssetBank,
}

// Ручная реализация Clone: клонируем только Arc, без требований к B.
impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            backends: Arc::clone(&self.backends),
            assets: self.assets.clone(),
        }
    }
}

/// Error side of `POST /api/call`, rendered as `{error}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Relay(e) if e.is_rejection() => StatusCode::BAD_REQUEST,
            ApiError::Relay(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), JsonReply(json!({ "error": self.to_string() }))).into_response()
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::Internal(format!("{e:#}"))
}

pub async fn api_call<B>(
    State(st): State<AppState<B>>,
    JsonAnyEncoding(req): JsonAnyEncoding<ApiCallRequest>,
) -> Result<JsonReply<Value>, ApiError>
where
    B: Backends,
{
    if req.backend.is_empty() || req.operation.is_empty() {
        return Err(ApiError::BadRequest("Missing backend or operation".into()));
    }
    let role: BackendRole = req.backend.parse()?;
    // unknown names and bad arguments stop here, before any client exists
    let call = registry::resolve(role, &req.operation, req.args)?;
    let policy = RetryPolicy::from_seconds(
        req.max_retries.unwrap_or(3),
        req.sleep_retry_seconds.unwrap_or(1.0),
    )?;
    tracing::info!(
        "api call {}.{} (max_retries={}, delay={:?})",
        role,
        call.operation(),
        policy.max_retries,
        policy.delay
    );

    let result = match role {
        BackendRole::Compass => {
            let settings = st.backends.settings().load();
            let client = st.backends.index_client(&settings).map_err(internal)?;
            compass_core::run(&call, Target::Compass(client.as_ref()), &policy).await?
        }
        BackendRole::Parser => {
            let client = st
                .backends
                .parser_client(ParserConfig::default())
                .map_err(internal)?;
            compass_core::run(&call, Target::Parser(client.as_ref()), &policy).await?
        }
    };
    Ok(JsonReply(json!({ "result": result })))
}

type ChatResult = Result<ChatGenerateResponse, (StatusCode, String)>;

fn chat_reply(res: ChatResult) -> Response {
    match res {
        Ok(ok) => JsonReply(ok).into_response(),
        Err((status, error)) => {
            tracing::warn!("chat failed: {}", error);
            (status, JsonReply(ChatFailure::new(error))).into_response()
        }
    }
}

fn server_error(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

pub async fn chat_generate<B>(
    State(st): State<AppState<B>>,
    JsonAnyEncoding(req): JsonAnyEncoding<ChatGenerateRequest>,
) -> Response
where
    B: Backends,
{
    if req.prompt.trim().is_empty() || req.index_name.trim().is_empty() {
        return chat_reply(Err((
            StatusCode::BAD_REQUEST,
            "Prompt and index name are required".into(),
        )));
    }
    chat_reply(generate(st.backends.as_ref(), &req.index_name, &req.prompt).await)
}

pub async fn index_chat_generate<B>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
    JsonAnyEncoding(req): JsonAnyEncoding<IndexChatRequest>,
) -> Response
where
    B: Backends,
{
    if req.prompt.trim().is_empty() {
        return chat_reply(Err((StatusCode::BAD_REQUEST, "Prompt is required".into())));
    }
    chat_reply(generate(st.backends.as_ref(), &index_name, &req.prompt).await)
}

/// Search the index with the prompt, then ask the model with the hits as
/// documents. No hits still means one chat call, with no documents.
async fn generate<B: Backends>(backends: &B, index_name: &str, prompt: &str) -> ChatResult {
    let settings = backends.settings().load();
    let eff = Effective::resolve(&settings, backends.config());
    let api_key = eff
        .require_api_key()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let index = backends.index_client(&settings).map_err(server_error)?;
    let payload = index
        .search_documents(index_name, prompt, CHAT_TOP_K)
        .await
        .map_err(server_error)?;
    if let Some(err) = &payload.error {
        tracing::warn!("chat context search on '{}' failed: {}", index_name, err);
    }
    let hits = normalize(&payload);
    let documents: Vec<ChatDocument> = hits
        .iter()
        .filter_map(|h| h.text.clone())
        .map(|text| ChatDocument { text })
        .collect();
    tracing::info!(
        "chat on '{}': {} hit(s), {} document(s), model {}",
        index_name,
        hits.len(),
        documents.len(),
        eff.chat_model
    );

    let llm = backends.chat_client(api_key).map_err(server_error)?;
    let req = ChatRequest::new(eff.chat_model.clone(), vec![ChatMessage::user(prompt)])
        .with_documents(documents);
    let reply = llm.chat(req).await.map_err(server_error)?;

    Ok(ChatGenerateResponse {
        success: true,
        response: reply.text,
        search_results: hits,
        model_used: eff.chat_model,
    })
}

/// Errors are reported in the body with status 200, the settings page
/// treats an empty model list as "type the name yourself".
pub async fn list_models<B>(
    State(st): State<AppState<B>>,
    Query(q): Query<ModelsQuery>,
) -> JsonReply<Value>
where
    B: Backends,
{
    let settings = st.backends.settings().load();
    let key = q
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| Effective::resolve(&settings, st.backends.config()).api_key);
    let Some(key) = key else {
        return JsonReply(json!({ "error": "API key is required" }));
    };

    let models = match st.backends.chat_client(&key) {
        Ok(client) => client.list_models().await,
        Err(e) => Err(e),
    };
    match models {
        Ok(models) => {
            let chat: Vec<ModelSummary> = models
                .into_iter()
                .filter(|m| m.supports_chat())
                .map(ModelSummary::from)
                .collect();
            JsonReply(json!({ "models": chat }))
        }
        Err(e) => {
            tracing::warn!("list models failed: {:#}", e);
            JsonReply(json!({ "error": format!("{e:#}") }))
        }
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn health_config<B>(State(st): State<AppState<B>>) -> JsonReply<Value>
where
    B: Backends,
{
    let masked = st.backends.config().reveal_masked();
    JsonReply(json!({ "config": masked }))
}
