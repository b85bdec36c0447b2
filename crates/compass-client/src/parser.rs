// file: src/parser.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::types::{ParseOutcome, ParsedDocument, ParserConfig};

/// Turns a folder of raw files into parsed documents.
#[async_trait]
pub trait ParserClient: Send + Sync {
    async fn process_folder(&self, folder: &Path) -> Result<Vec<ParseOutcome>>;
}

pub struct CompassParserClient {
    http: reqwest::Client,
    parser_url: String,
    bearer_token: Option<String>,
    config: ParserConfig,
}

impl CompassParserClient {
    pub fn new(
        parser_url: &str,
        bearer_token: Option<String>,
        config: ParserConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build parser http client")?;
        Ok(Self {
            http,
            parser_url: parser_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
            config,
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    async fn process_file(&self, path: &Path) -> Result<Value> {
        let filename = file_name(path);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let data = json!({ "parser_config": self.config }).to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .text("data", data)
            .part("file", part);

        let mut req = self
            .http
            .post(format!("{}/v1/process_file", self.parser_url))
            .multipart(form);
        if let Some(t) = &self.bearer_token {
            req = req.bearer_auth(t);
        }

        let resp = req.send().await.context("parser request")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("parser http {}: {}", status, text);
        }
        resp.json().await.context("parser json")
    }
}

#[async_trait]
impl ParserClient for CompassParserClient {
    async fn process_folder(&self, folder: &Path) -> Result<Vec<ParseOutcome>> {
        let files = list_files(folder)?;
        tracing::info!("parsing {} file(s) from {}", files.len(), folder.display());

        let mut out = Vec::new();
        for path in files {
            let filename = file_name(&path);
            match self.process_file(&path).await {
                Ok(body) => out.extend(outcomes_from_body(&filename, body)),
                Err(e) => out.push(ParseOutcome::Failed {
                    filename,
                    error: format!("{e:#}"),
                }),
            }
        }
        Ok(out)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Regular files directly inside `folder`, sorted by name.
fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("list {}", folder.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// The parser answers with a bare list, `{docs: [...]}`/`{documents: [...]}`
/// or a single document object.
fn outcomes_from_body(filename: &str, body: Value) -> Vec<ParseOutcome> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map
            .remove("docs")
            .or_else(|| map.remove("documents"))
        {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(map)],
        },
        other => {
            return vec![ParseOutcome::Failed {
                filename: filename.to_string(),
                error: format!("unexpected parser answer: {other}"),
            }]
        }
    };

    items
        .into_iter()
        .map(|item| match serde_json::from_value::<ParsedDocument>(item) {
            Ok(mut doc) => {
                if doc.filename.is_empty() {
                    doc.filename = filename.to_string();
                }
                ParseOutcome::Parsed(doc)
            }
            Err(e) => ParseOutcome::Failed {
                filename: filename.to_string(),
                error: e.to_string(),
            },
        })
        .collect()
}
