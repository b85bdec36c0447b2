use compass_core::SearchHit;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/call`. The older snake_case names are still accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallRequest {
    #[serde(default, alias = "client_type")]
    pub backend: String,
    #[serde(default, alias = "method")]
    pub operation: String,
    #[serde(default, alias = "params")]
    pub args: Value,
    #[serde(default, alias = "max_retries")]
    pub max_retries: Option<u32>,
    #[serde(default, alias = "sleep_retry_seconds")]
    pub sleep_retry_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatGenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, rename = "indexName", alias = "index_name")]
    pub index_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexChatRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGenerateResponse {
    pub success: bool,
    pub response: String,
    pub search_results: Vec<SearchHit>,
    pub model_used: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatFailure {
    pub success: bool,
    pub error: String,
}

impl ChatFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsQuery {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub name: String,
    pub description: String,
    pub endpoints: Vec<String>,
    pub context_length: u64,
}

impl From<llm_traits::ModelInfo> for ModelSummary {
    fn from(m: llm_traits::ModelInfo) -> Self {
        Self {
            name: m.name,
            description: m.description,
            endpoints: m.endpoints,
            context_length: m.context_length,
        }
    }
}
