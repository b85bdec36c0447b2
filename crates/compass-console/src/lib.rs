pub mod api;
pub mod backend;
pub mod extract;
pub mod model;
pub mod pages;
pub mod server_config;
pub mod settings;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use api::AppState;
pub use backend::{Backends, HasConfig, LiveBackends};
pub use server_config::ServerConfig;

/// Full route table. Generic over the collaborator factory so tests can
/// mount the same router over fakes.
pub fn router<B: Backends>(state: AppState<B>) -> Router {
    let body_limit = state
        .backends
        .config()
        .http
        .max_upload_mb
        .saturating_mul(1024 * 1024);

    Router::new()
        .route("/", get(pages::home::<B>))
        .route("/indexes", get(pages::list_indexes::<B>))
        .route(
            "/indexes/create",
            get(pages::create_index_form::<B>).post(pages::create_index_submit::<B>),
        )
        .route("/indexes/:index_name", get(pages::view_index::<B>))
        .route(
            "/indexes/:index_name/search",
            get(pages::search_form::<B>).post(pages::search_submit::<B>),
        )
        .route(
            "/indexes/:index_name/upload",
            get(pages::upload_form::<B>).post(pages::upload_submit::<B>),
        )
        .route("/indexes/:index_name/chat", get(pages::chat_index::<B>))
        .route(
            "/indexes/:index_name/chat-generate",
            post(api::index_chat_generate::<B>),
        )
        .route("/api-explorer", get(pages::api_explorer::<B>))
        .route("/docs", get(pages::docs::<B>))
        .route("/chat", get(pages::chat_home::<B>))
        .route("/chat/generate", post(api::chat_generate::<B>))
        .route(
            "/settings",
            get(pages::settings_form::<B>).post(pages::settings_submit::<B>),
        )
        .route("/static/*path", get(pages::static_asset::<B>))
        .route("/api/call", post(api::api_call::<B>))
        .route("/api/models", get(api::list_models::<B>))
        .route("/health", get(api::health))
        .route("/health/config", get(api::health_config::<B>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_origin(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
