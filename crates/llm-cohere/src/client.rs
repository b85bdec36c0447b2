// crates/llm-cohere/src/client.rs

use std::time::Duration;

use anyhow::Context;
use llm_traits::{ChatRequest, ChatResponse, LlmClient, ModelInfo};
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

pub struct CohereClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CohereClient {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, Duration::from_secs(120))
    }

    pub fn with_base_url(
        api_key: String,
        base_url: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build cohere http client")?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn chat_body(req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": req.model,
            "messages": req.messages,
        });
        if !req.documents.is_empty() {
            let docs: Vec<Value> = req
                .documents
                .iter()
                .map(|d| json!({ "data": { "text": d.text } }))
                .collect();
            body["documents"] = Value::Array(docs);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = req.max_tokens {
            body["max_tokens"] = json!(m);
        }
        body
    }
}

/// v2 replies carry the text in `message.content[0].text`.
fn reply_text(v: &Value) -> anyhow::Result<String> {
    v.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
        .and_then(|parts| parts.first())
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("cohere reply has no message text"))
}

fn map_models(v: &Value) -> Vec<ModelInfo> {
    let Some(models) = v.get("models").and_then(|m| m.as_array()) else {
        return Vec::new();
    };
    models
        .iter()
        .filter_map(|m| {
            let name = m.get("name")?.as_str()?.to_string();
            Some(ModelInfo {
                name,
                description: m
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                endpoints: m
                    .get("endpoints")
                    .and_then(|e| e.as_array())
                    .map(|e| {
                        e.iter()
                            .filter_map(|x| x.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
                context_length: m
                    .get("context_length")
                    .and_then(|c| c.as_u64())
                    .unwrap_or(0),
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl LlmClient for CohereClient {
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let url = format!("{}/v2/chat", self.base_url);
        let body = Self::chat_body(&req);
        tracing::debug!(
            "cohere chat: model={} documents={}",
            req.model,
            req.documents.len()
        );

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("cohere chat request")?;

        let resp_status = resp.status();
        if !resp_status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("cohere http {}: {}", resp_status, text));
        }

        let v: Value = resp.json().await.context("cohere chat json")?;
        Ok(ChatResponse {
            text: reply_text(&v)?,
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self
            .http
            .get(url)
            .query(&[("page_size", "1000")])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("cohere models request")?;

        let resp_status = resp.status();
        if !resp_status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("cohere http {}: {}", resp_status, text));
        }

        let v: Value = resp.json().await.context("cohere models json")?;
        Ok(map_models(&v))
    }
}
