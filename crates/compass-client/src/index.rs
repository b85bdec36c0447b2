// file: src/index.rs

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::payload::ResponsePayload;
use crate::types::{IndexConfig, ParsedDocument};

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub index_name: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub document_id: Option<String>,
}

/// Operations consumed from the index service.
#[async_trait]
pub trait IndexClient: Send + Sync {
    async fn list_indexes(&self) -> Result<ResponsePayload>;
    async fn create_index(&self, index_name: &str, config: &IndexConfig) -> Result<ResponsePayload>;
    async fn search_documents(
        &self,
        index_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<ResponsePayload>;
    async fn upload_document(&self, upload: DocumentUpload) -> Result<ResponsePayload>;
    async fn insert_docs(
        &self,
        index_name: &str,
        docs: Vec<ParsedDocument>,
    ) -> Result<ResponsePayload>;
}

pub struct CompassClient {
    http: reqwest::Client,
    index_url: String,
    bearer_token: Option<String>,
}

impl CompassClient {
    pub fn new(index_url: &str, bearer_token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build compass http client")?;
        Ok(Self {
            http,
            index_url: index_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        })
    }

    fn index_path(&self, index_name: &str) -> String {
        format!(
            "{}/api/v1/indexes/{}",
            self.index_url,
            urlencoding::encode(index_name)
        )
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<ResponsePayload> {
        let req = match &self.bearer_token {
            Some(t) => req.bearer_auth(t),
            None => req,
        };
        let resp = req.send().await.context("compass request")?;
        let status = resp.status();
        let text = resp.text().await.context("compass response body")?;

        if !status.is_success() {
            tracing::warn!("compass http {}: {}", status, text);
            return Ok(ResponsePayload::failed(format!("{}: {}", status, text)));
        }
        if text.trim().is_empty() {
            return Ok(ResponsePayload::default());
        }
        let body: Value = serde_json::from_str(&text).context("compass json")?;
        Ok(ResponsePayload::from_body(body))
    }
}

#[async_trait]
impl IndexClient for CompassClient {
    async fn list_indexes(&self) -> Result<ResponsePayload> {
        let url = format!("{}/api/v1/indexes", self.index_url);
        self.send(self.http.get(url)).await
    }

    async fn create_index(
        &self,
        index_name: &str,
        config: &IndexConfig,
    ) -> Result<ResponsePayload> {
        tracing::info!("create index '{}' ({:?})", index_name, config.max_chunks_per_doc);
        self.send(self.http.put(self.index_path(index_name)).json(config))
            .await
    }

    async fn search_documents(
        &self,
        index_name: &str,
        query: &str,
        top_k: usize,
    ) -> Result<ResponsePayload> {
        let url = format!("{}/documents/_search", self.index_path(index_name));
        let body = json!({ "query": query, "top_k": top_k });
        self.send(self.http.post(url).json(&body)).await
    }

    async fn upload_document(&self, upload: DocumentUpload) -> Result<ResponsePayload> {
        let url = format!("{}/documents/_upload", self.index_path(&upload.index_name));
        let body = upload_body(&upload);
        tracing::info!(
            "upload '{}' ({} bytes, {}) → {}",
            upload.filename,
            upload.bytes.len(),
            upload.content_type,
            upload.index_name
        );
        self.send(self.http.post(url).json(&body)).await
    }

    async fn insert_docs(
        &self,
        index_name: &str,
        docs: Vec<ParsedDocument>,
    ) -> Result<ResponsePayload> {
        let url = format!("{}/documents", self.index_path(index_name));
        tracing::info!("insert {} parsed docs → {}", docs.len(), index_name);
        self.send(self.http.put(url).json(&json!({ "docs": docs })))
            .await
    }
}

fn upload_body(upload: &DocumentUpload) -> Value {
    let mut body = json!({
        "filename": upload.filename,
        "content_type": upload.content_type,
        "content_base64": base64::engine::general_purpose::STANDARD.encode(&upload.bytes),
    });
    if let Some(id) = &upload.document_id {
        body["document_id"] = json!(id);
    }
    body
}
