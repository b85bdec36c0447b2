use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use compass_client::{
    DocumentUpload, IndexClient, IndexConfig, ParseOutcome, ParsedDocument, ParserClient,
    ParserConfig, ResponsePayload,
};
use compass_console::{
    router, settings::SettingsStore, AppState, Backends, HasConfig, ServerConfig,
};
use console_assets::AssetBank;
use llm_traits::{ChatRequest, ChatResponse, LlmClient, ModelInfo};

// ---------- fakes ----------

#[derive(Default)]
struct FakeIndex {
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<DocumentUpload>>,
    inserted: Mutex<Vec<ParsedDocument>>,
    /// Query that answers with hits; every other query answers empty.
    hit_query: Option<&'static str>,
}

impl FakeIndex {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IndexClient for FakeIndex {
    async fn list_indexes(&self) -> anyhow::Result<ResponsePayload> {
        self.record("list_indexes".into());
        Ok(ResponsePayload::from_body(json!({
            "indexes": [{ "name": "idx1", "count": 2 }, { "name": "empty", "count": 0 }]
        })))
    }

    async fn create_index(&self, name: &str, cfg: &IndexConfig) -> anyhow::Result<ResponsePayload> {
        self.record(format!("create_index {} {:?}", name, cfg.max_chunks_per_doc));
        Ok(ResponsePayload::default())
    }

    async fn search_documents(
        &self,
        name: &str,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<ResponsePayload> {
        self.record(format!("search {} {:?} {}", name, query, top_k));
        if Some(query) == self.hit_query {
            return Ok(ResponsePayload::from_body(json!({
                "hits": [{ "content": { "text": "sampled chunk" }, "document_id": "d1", "score": 0.9 }]
            })));
        }
        Ok(ResponsePayload::default())
    }

    async fn upload_document(&self, upload: DocumentUpload) -> anyhow::Result<ResponsePayload> {
        self.record("upload_document".into());
        self.uploads.lock().unwrap().push(upload);
        Ok(ResponsePayload::default())
    }

    async fn insert_docs(
        &self,
        name: &str,
        docs: Vec<ParsedDocument>,
    ) -> anyhow::Result<ResponsePayload> {
        self.record(format!("insert_docs {} {}", name, docs.len()));
        self.inserted.lock().unwrap().extend(docs);
        Ok(ResponsePayload::default())
    }
}

/// Parses every file it finds; `fail_all` turns them into failures.
#[derive(Default)]
struct FakeParser {
    fail_all: bool,
}

#[async_trait]
impl ParserClient for FakeParser {
    async fn process_folder(&self, folder: &Path) -> anyhow::Result<Vec<ParseOutcome>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let filename = entry?.file_name().to_string_lossy().into_owned();
            out.push(if self.fail_all {
                ParseOutcome::Failed {
                    filename,
                    error: "unsupported".into(),
                }
            } else {
                ParseOutcome::Parsed(ParsedDocument {
                    filename,
                    ..Default::default()
                })
            });
        }
        Ok(out)
    }
}

#[derive(Default)]
struct FakeLlm {
    requests: Mutex<Vec<ChatRequest>>,
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(req);
        Ok(ChatResponse {
            text: "X is a thing.".into(),
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(vec![
            ModelInfo {
                name: "command-r".into(),
                description: String::new(),
                endpoints: vec!["chat".into(), "generate".into()],
                context_length: 128000,
            },
            ModelInfo {
                name: "embed-v4".into(),
                description: String::new(),
                endpoints: vec!["embed".into()],
                context_length: 512,
            },
        ])
    }
}

struct FakeBackends {
    cfg: ServerConfig,
    settings: SettingsStore,
    index: Arc<FakeIndex>,
    parser: Arc<FakeParser>,
    llm: Arc<FakeLlm>,
    parser_configs: Mutex<Vec<ParserConfig>>,
    _dir: tempfile::TempDir,
}

impl FakeBackends {
    fn new(index: FakeIndex, parser: FakeParser) -> Arc<Self> {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ServerConfig::default();
        cfg.cohere.api_key = Some("env-key".into());
        cfg.storage.settings_file = dir.path().join("settings.toml");
        cfg.storage.upload_dir = dir.path().join("uploads");
        Arc::new(Self {
            settings: SettingsStore::new(cfg.storage.settings_file.clone()),
            cfg,
            index: Arc::new(index),
            parser: Arc::new(parser),
            llm: Arc::new(FakeLlm::default()),
            parser_configs: Mutex::new(Vec::new()),
            _dir: dir,
        })
    }
}

impl HasConfig for FakeBackends {
    fn config(&self) -> &ServerConfig {
        &self.cfg
    }
}

impl Backends for FakeBackends {
    fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    fn index_client(
        &self,
        _: &compass_console::settings::Settings,
    ) -> anyhow::Result<Arc<dyn IndexClient>> {
        Ok(self.index.clone())
    }

    fn parser_client(&self, config: ParserConfig) -> anyhow::Result<Arc<dyn ParserClient>> {
        self.parser_configs.lock().unwrap().push(config);
        Ok(self.parser.clone())
    }

    fn chat_client(&self, _: &str) -> anyhow::Result<Arc<dyn LlmClient>> {
        Ok(self.llm.clone())
    }
}

fn app(backends: &Arc<FakeBackends>) -> Router {
    router(AppState {
        backends: backends.clone(),
        assets: AssetBank::default(),
    })
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8_lossy(&bytes).into_owned())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "XBOUNDARYX";

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
                    name, f
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

fn post_multipart(uri: &str, body: Body) -> Request<Body> {
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

// ---------- upload ----------

#[tokio::test]
async fn plain_upload_sends_exact_bytes_and_redirects() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let body = multipart(&[("document", Some("notes.txt"), "0123456789")]);
    let (status, headers, _) = send(app(&b), post_multipart("/indexes/idx/upload", body)).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/indexes/idx");

    let uploads = b.index.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    let up = &uploads[0];
    assert_eq!(up.index_name, "idx");
    assert_eq!(up.filename, "notes.txt");
    assert_eq!(up.bytes, b"0123456789".to_vec());
    assert_eq!(up.content_type, "text/plain");
    let id = up.document_id.as_deref().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert_eq!(b.index.calls(), vec!["upload_document".to_string()]);
    assert!(b.parser_configs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upload_without_file_shows_error() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let body = multipart(&[("chunk_size", None, "10")]);
    let (status, _, html) = send(app(&b), post_multipart("/indexes/idx/upload", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("No file selected"));
    assert!(b.index.calls().is_empty());
}

#[tokio::test]
async fn prechunked_upload_parses_inserts_and_cleans_up() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let body = multipart(&[
        ("document", Some("report.txt"), "some text"),
        ("advanced_settings", None, "on"),
        ("pdf_parsing_strategy", None, "text_extraction"),
        ("chunk_size", None, "400"),
        ("chunk_overlap", None, "40"),
    ]);
    let (status, headers, _) = send(app(&b), post_multipart("/indexes/idx/upload", body)).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/indexes/idx");
    let cfgs = b.parser_configs.lock().unwrap().clone();
    assert_eq!(cfgs.len(), 1);
    assert_eq!(cfgs[0].num_tokens_per_chunk, 400);
    assert_eq!(cfgs[0].num_tokens_overlap, 40);
    assert_eq!(
        cfgs[0].pdf_parsing_strategy,
        Some(compass_client::PdfParsingStrategy::QuickText)
    );
    let inserted = b.index.inserted.lock().unwrap().clone();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].filename, "report.txt");
    assert!(!b.cfg.storage.upload_dir.join("report.txt").exists());
}

#[tokio::test]
async fn prechunked_upload_with_nothing_parsed_fails() {
    let parser = FakeParser {
        fail_all: true,
        ..Default::default()
    };
    let b = FakeBackends::new(FakeIndex::default(), parser);
    let body = multipart(&[
        ("document", Some("broken.bin"), "\u{0}\u{1}"),
        ("advanced_settings", None, "on"),
    ]);
    let (status, _, html) = send(app(&b), post_multipart("/indexes/idx/upload", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("No documents were successfully parsed"));
    assert!(b.index.inserted.lock().unwrap().is_empty());
    assert!(!b.cfg.storage.upload_dir.join("broken.bin").exists());
}

// ---------- chat ----------

#[tokio::test]
async fn chat_with_zero_hits_still_generates() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = post_json(
        "/chat/generate",
        json!({ "prompt": "what is X", "indexName": "idx1" }),
    );
    let (status, _, body) = send(app(&b), req).await;

    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["response"], "X is a thing.");
    assert_eq!(v["searchResults"], json!([]));
    assert_eq!(v["modelUsed"], "command-a-03-2025");

    assert_eq!(b.index.calls(), vec![r#"search idx1 "what is X" 5"#.to_string()]);
    let reqs = b.llm.requests.lock().unwrap().clone();
    assert_eq!(reqs.len(), 1);
    assert!(reqs[0].documents.is_empty());
    assert_eq!(reqs[0].messages[0].content, "what is X");
}

#[tokio::test]
async fn index_chat_passes_hits_as_documents() {
    let index = FakeIndex {
        hit_query: Some("what is X"),
        ..Default::default()
    };
    let b = FakeBackends::new(index, FakeParser::default());
    let req = post_json("/indexes/idx1/chat-generate", json!({ "prompt": "what is X" }));
    let (status, _, body) = send(app(&b), req).await;

    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["searchResults"][0]["text"], "sampled chunk");
    assert_eq!(v["searchResults"][0]["documentId"], "d1");
    let reqs = b.llm.requests.lock().unwrap().clone();
    assert_eq!(reqs[0].documents.len(), 1);
    assert_eq!(reqs[0].documents[0].text, "sampled chunk");
}

#[tokio::test]
async fn chat_requires_prompt_and_index() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let (status, _, body) = send(app(&b), post_json("/chat/generate", json!({ "prompt": "hi" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["success"], false);
    assert!(b.llm.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn chat_uses_model_from_settings() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let form = "bearer_token=&api_key=ui-key&chat_model=command-r";
    let req = Request::post("/settings")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let (status, _, html) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Settings saved successfully!"));

    let saved = b.settings.load();
    assert_eq!(saved.api_key.as_deref(), Some("ui-key"));
    assert_eq!(saved.bearer_token, None);

    let req = post_json("/chat/generate", json!({ "prompt": "hi", "indexName": "idx1" }));
    let (_, _, body) = send(app(&b), req).await;
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["modelUsed"], "command-r");
}

// ---------- api explorer relay ----------

#[tokio::test]
async fn api_call_unknown_operation_is_rejected_without_calls() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = post_json(
        "/api/call",
        json!({ "backend": "compass", "operation": "drop_everything", "args": {} }),
    );
    let (status, _, body) = send(app(&b), req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["error"], "Method 'drop_everything' not found on compass client");
    assert!(b.index.calls().is_empty());
}

#[tokio::test]
async fn api_call_unknown_backend_and_bad_args() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = post_json("/api/call", json!({ "backend": "cohere", "operation": "chat" }));
    let (status, _, body) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unknown client type: cohere"));

    let req = post_json(
        "/api/call",
        json!({ "backend": "compass", "operation": "search_documents", "args": { "index_name": "idx1" } }),
    );
    let (status, _, _) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(b.index.calls().is_empty());
}

#[tokio::test]
async fn api_call_with_oversized_retry_delay_is_rejected() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = post_json(
        "/api/call",
        json!({ "backend": "compass", "operation": "list_indexes", "sleepRetrySeconds": 1e20 }),
    );
    let (status, _, body) = send(app(&b), req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert!(v["error"].as_str().unwrap().starts_with("Invalid retry delay"));
    assert!(b.index.calls().is_empty());
}

#[tokio::test]
async fn api_call_runs_operation_with_snake_case_fields() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = post_json(
        "/api/call",
        json!({
            "client_type": "compass",
            "method": "search_documents",
            "params": { "index_name": "idx1", "query": "q" },
            "max_retries": 0,
            "sleep_retry_seconds": 0
        }),
    );
    let (status, _, body) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert!(v.get("result").is_some());
    assert_eq!(b.index.calls(), vec![r#"search idx1 "q" 10"#.to_string()]);
}

// ---------- pages ----------

#[tokio::test]
async fn index_page_browses_with_probe_queries() {
    let index = FakeIndex {
        hit_query: Some("in"),
        ..Default::default()
    };
    let b = FakeBackends::new(index, FakeParser::default());
    let req = Request::get("/indexes/idx1").body(Body::empty()).unwrap();
    let (status, _, html) = send(app(&b), req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("sampled chunk"));
    assert_eq!(
        b.index.calls(),
        vec![
            "list_indexes".to_string(),
            r#"search idx1 "the" 100"#.to_string(),
            r#"search idx1 "a" 100"#.to_string(),
            r#"search idx1 "in" 100"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn empty_index_is_not_browsed() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = Request::get("/indexes/empty").body(Body::empty()).unwrap();
    let (status, _, html) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("No documents found"));
    assert_eq!(b.index.calls(), vec!["list_indexes".to_string()]);
}

#[tokio::test]
async fn unknown_index_renders_not_found() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = Request::get("/indexes/ghost").body(Body::empty()).unwrap();
    let (_, _, html) = send(app(&b), req).await;
    assert!(html.contains("Index &#39;ghost&#39; not found"));
}

#[tokio::test]
async fn create_index_redirects_to_listing() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = Request::post("/indexes/create")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("index_name=fresh&max_chunks_per_doc=25"))
        .unwrap();
    let (status, headers, _) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/indexes");
    assert_eq!(b.index.calls(), vec!["create_index fresh Some(25)".to_string()]);
}

#[tokio::test]
async fn models_are_filtered_to_chat() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let req = Request::get("/api/models").body(Body::empty()).unwrap();
    let (status, _, body) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    let models = v["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["name"], "command-r");
    assert_eq!(models[0]["contextLength"], 128000);
}

#[tokio::test]
async fn health_and_static_assets() {
    let b = FakeBackends::new(FakeIndex::default(), FakeParser::default());
    let (status, _, body) = send(app(&b), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let req = Request::get("/static/css/console.css").body(Body::empty()).unwrap();
    let (status, headers, _) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/css; charset=utf-8");

    let req = Request::get("/static/nope.js").body(Body::empty()).unwrap();
    let (status, _, _) = send(app(&b), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::get("/health/config").body(Body::empty()).unwrap();
    let (_, _, body) = send(app(&b), req).await;
    assert!(!body.contains("env-key"));
}
