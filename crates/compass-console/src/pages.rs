// /src/pages.rs
//
// Server-rendered pages. Every handler renders its own error into the page;
// nothing here answers with a bare error status except the static route.
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use compass_client::{IndexClient, IndexConfig, IndexInfo};
use compass_core::{normalize, SearchHit, OPERATIONS};
use console_assets::AssetBank;

use crate::{
    api::AppState,
    backend::{Backends, Effective},
    settings::Settings,
    upload::{self, ParsingStrategy, Prechunk, StagedUpload},
};

/// Broad queries used to sample an index's documents, in order.
pub const PROBE_QUERIES: [&str; 11] = [
    "the", "a", "in", "to", "and", "of", "is", "for", "on", "with", " ",
];
pub const BROWSE_TOP_K: usize = 100;
const DEFAULT_TOP_K: usize = 10;
const DEFAULT_MAX_CHUNKS: u32 = 100;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn index_path(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

fn page(assets: &AssetBank, title: &str, body: String) -> Response {
    Html(assets.render("layout", &[("TITLE", &escape(title)), ("BODY", &body)])).into_response()
}

fn alert(kind: &str, msg: Option<&str>) -> String {
    match msg {
        Some(m) => format!(r#"<div class="alert alert-{}">{}</div>"#, kind, escape(m)),
        None => String::new(),
    }
}

pub fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return r#"<p class="muted">No documents found.</p>"#.to_string();
    }
    let mut out = String::new();
    for hit in hits {
        out.push_str(r#"<div class="hit">"#);
        if let Some(id) = &hit.document_id {
            out.push_str(&format!(r#"<div class="muted">{}</div>"#, escape(id)));
        }
        if let Some(score) = hit.score {
            out.push_str(&format!(r#"<div class="muted">score {:.4}</div>"#, score));
        }
        out.push_str(&format!(
            "<p>{}</p>",
            escape(hit.text.as_deref().unwrap_or("(no text)"))
        ));
        out.push_str("</div>\n");
    }
    out
}

fn render_details(index: &IndexInfo) -> String {
    let mut out = String::from(r#"<dl class="card">"#);
    out.push_str(&format!("<dt>Name</dt><dd>{}</dd>", escape(&index.name)));
    out.push_str(&format!("<dt>Documents</dt><dd>{}</dd>", index.count));
    for (k, v) in &index.extra {
        let shown = match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("<dt>{}</dt><dd>{}</dd>", escape(k), escape(&shown)));
    }
    out.push_str("</dl>");
    out
}

fn index_client<B: Backends>(st: &AppState<B>) -> anyhow::Result<std::sync::Arc<dyn IndexClient>> {
    let settings = st.backends.settings().load();
    st.backends.index_client(&settings)
}

/// All indexes, or the message to show instead.
async fn fetch_indexes(index: &dyn IndexClient) -> Result<Vec<IndexInfo>, String> {
    let payload = index.list_indexes().await.map_err(|e| format!("{e:#}"))?;
    match payload.error {
        Some(err) => Err(err),
        None => Ok(payload.indexes()),
    }
}

/// Sample documents with the probe queries; stops at the first query that
/// yields hits. Failures only cost the sample.
pub async fn browse(index: &dyn IndexClient, index_name: &str) -> Vec<SearchHit> {
    for query in PROBE_QUERIES {
        match index.search_documents(index_name, query, BROWSE_TOP_K).await {
            Ok(payload) => {
                let hits = normalize(&payload);
                if !hits.is_empty() {
                    tracing::debug!(
                        "browse '{}': {} hit(s) for {:?}",
                        index_name,
                        hits.len(),
                        query
                    );
                    return hits;
                }
            }
            Err(e) => {
                tracing::warn!("browse '{}' failed: {:#}", index_name, e);
                return Vec::new();
            }
        }
    }
    tracing::debug!("browse '{}': nothing found", index_name);
    Vec::new()
}

pub async fn home<B: Backends>(State(st): State<AppState<B>>) -> Response {
    page(&st.assets, "Home", st.assets.template("home"))
}

pub async fn docs<B: Backends>(State(st): State<AppState<B>>) -> Response {
    page(&st.assets, "Documentation", st.assets.template("documentation"))
}

pub async fn list_indexes<B: Backends>(State(st): State<AppState<B>>) -> Response {
    let listed = match index_client(&st) {
        Ok(c) => fetch_indexes(c.as_ref()).await,
        Err(e) => Err(format!("{e:#}")),
    };
    let (rows, error) = match listed {
        Ok(indexes) => {
            let rows: String = indexes
                .iter()
                .map(|idx| {
                    format!(
                        r#"<tr><td><a href="/indexes/{p}">{n}</a></td><td>{c}</td><td><a href="/indexes/{p}/search">Search</a> · <a href="/indexes/{p}/upload">Upload</a> · <a href="/indexes/{p}/chat">Chat</a></td></tr>"#,
                        p = index_path(&idx.name),
                        n = escape(&idx.name),
                        c = idx.count
                    )
                })
                .collect();
            (rows, None)
        }
        Err(e) => (String::new(), Some(e)),
    };
    let body = st.assets.render(
        "indexes",
        &[("ERROR", &alert("error", error.as_deref())), ("ROWS", &rows)],
    );
    page(&st.assets, "Indexes", body)
}

fn create_page(assets: &AssetBank, error: Option<&str>) -> Response {
    let body = assets.render("create_index", &[("ERROR", &alert("error", error))]);
    page(assets, "Create index", body)
}

pub async fn create_index_form<B: Backends>(State(st): State<AppState<B>>) -> Response {
    create_page(&st.assets, None)
}

#[derive(Debug, Deserialize)]
pub struct CreateIndexForm {
    #[serde(default)]
    pub index_name: String,
    #[serde(default)]
    pub max_chunks_per_doc: String,
}

pub async fn create_index_submit<B: Backends>(
    State(st): State<AppState<B>>,
    Form(form): Form<CreateIndexForm>,
) -> Response {
    let name = form.index_name.trim();
    if name.is_empty() {
        return create_page(&st.assets, Some("Index name is required"));
    }
    let max_chunks = form
        .max_chunks_per_doc
        .trim()
        .parse::<u32>()
        .unwrap_or(DEFAULT_MAX_CHUNKS);

    let client = match index_client(&st) {
        Ok(c) => c,
        Err(e) => return create_page(&st.assets, Some(&format!("{e:#}"))),
    };
    match client
        .create_index(name, &IndexConfig::with_max_chunks(max_chunks))
        .await
    {
        Ok(payload) => match payload.error {
            Some(err) => create_page(&st.assets, Some(&err)),
            None => {
                tracing::info!("created index '{}' (max_chunks_per_doc={})", name, max_chunks);
                Redirect::to("/indexes").into_response()
            }
        },
        Err(e) => create_page(&st.assets, Some(&format!("{e:#}"))),
    }
}

pub async fn view_index<B: Backends>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
) -> Response {
    let render = |error: Option<&str>, details: String, documents: String| {
        let body = st.assets.render(
            "view_index",
            &[
                ("INDEX_NAME", &escape(&index_name)),
                ("INDEX_PATH", &index_path(&index_name)),
                ("ERROR", &alert("error", error)),
                ("DETAILS", &details),
                ("DOCUMENTS", &documents),
            ],
        );
        page(&st.assets, &index_name, body)
    };

    let client = match index_client(&st) {
        Ok(c) => c,
        Err(e) => return render(Some(&format!("{e:#}")), String::new(), String::new()),
    };
    let indexes = match fetch_indexes(client.as_ref()).await {
        Ok(v) => v,
        Err(e) => return render(Some(&e), String::new(), String::new()),
    };
    let Some(index) = indexes.into_iter().find(|i| i.name == index_name) else {
        let msg = format!("Index '{}' not found", index_name);
        return render(Some(&msg), String::new(), String::new());
    };

    let hits = if index.count > 0 {
        browse(client.as_ref(), &index_name).await
    } else {
        Vec::new()
    };
    tracing::info!("index '{}': showing {} document(s)", index_name, hits.len());
    render(None, render_details(&index), render_hits(&hits))
}

fn search_page(
    assets: &AssetBank,
    index_name: &str,
    query: &str,
    top_k: usize,
    error: Option<&str>,
    documents: String,
) -> Response {
    let body = assets.render(
        "search",
        &[
            ("INDEX_NAME", &escape(index_name)),
            ("INDEX_PATH", &index_path(index_name)),
            ("ERROR", &alert("error", error)),
            ("QUERY", &escape(query)),
            ("TOP_K", &top_k.to_string()),
            ("DOCUMENTS", &documents),
        ],
    );
    page(assets, &format!("Search {}", index_name), body)
}

pub async fn search_form<B: Backends>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
) -> Response {
    search_page(&st.assets, &index_name, "", DEFAULT_TOP_K, None, String::new())
}

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub top_k: String,
}

pub async fn search_submit<B: Backends>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
    Form(form): Form<SearchForm>,
) -> Response {
    let top_k = form.top_k.trim().parse::<usize>().unwrap_or(DEFAULT_TOP_K);
    let fail = |msg: String| {
        search_page(
            &st.assets,
            &index_name,
            &form.query,
            top_k,
            Some(&msg),
            String::new(),
        )
    };

    let client = match index_client(&st) {
        Ok(c) => c,
        Err(e) => return fail(format!("{e:#}")),
    };
    let payload = match client.search_documents(&index_name, &form.query, top_k).await {
        Ok(p) => p,
        Err(e) => return fail(format!("{e:#}")),
    };
    if let Some(err) = payload.error.clone() {
        return fail(err);
    }
    let hits = normalize(&payload);
    tracing::info!("search '{}' for {:?}: {} hit(s)", index_name, form.query, hits.len());
    search_page(&st.assets, &index_name, &form.query, top_k, None, render_hits(&hits))
}

fn upload_page(assets: &AssetBank, index_name: &str, error: Option<&str>) -> Response {
    let body = assets.render(
        "upload",
        &[
            ("INDEX_NAME", &escape(index_name)),
            ("INDEX_PATH", &index_path(index_name)),
            ("ERROR", &alert("error", error)),
        ],
    );
    page(assets, &format!("Upload to {}", index_name), body)
}

pub async fn upload_form<B: Backends>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
) -> Response {
    upload_page(&st.assets, &index_name, None)
}

#[derive(Default)]
struct UploadFields {
    filename: Option<String>,
    bytes: Vec<u8>,
    content_type: Option<String>,
    advanced: bool,
    strategy: Option<String>,
    chunk_size: Option<String>,
    chunk_overlap: Option<String>,
}

async fn read_upload(mp: &mut Multipart) -> anyhow::Result<UploadFields> {
    let mut f = UploadFields::default();
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "document" => {
                f.filename = field.file_name().map(|s| s.to_string());
                f.content_type = field.content_type().map(|s| s.to_string());
                f.bytes = field.bytes().await?.to_vec();
            }
            "advanced_settings" => {
                f.advanced = true;
                let _ = field.bytes().await?;
            }
            "pdf_parsing_strategy" | "chunk_size" | "chunk_overlap" => {
                let text = field.text().await?;
                match name.as_str() {
                    "pdf_parsing_strategy" => f.strategy = Some(text),
                    "chunk_size" => f.chunk_size = Some(text),
                    _ => f.chunk_overlap = Some(text),
                }
            }
            _ => {
                let _ = field.bytes().await?;
            }
        }
    }
    Ok(f)
}

pub async fn upload_submit<B: Backends>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
    mut mp: Multipart,
) -> Response {
    let fields = match read_upload(&mut mp).await {
        Ok(f) => f,
        Err(e) => return upload_page(&st.assets, &index_name, Some(&format!("{e:#}"))),
    };
    let Some(filename) = fields.filename.filter(|n| !n.is_empty()) else {
        return upload_page(&st.assets, &index_name, Some("No file selected"));
    };

    let prechunk = fields.advanced.then(|| {
        let d = Prechunk::default();
        let num = |v: &Option<String>, dflt: u32| {
            v.as_deref()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(dflt)
        };
        Prechunk {
            chunk_size: num(&fields.chunk_size, d.chunk_size),
            chunk_overlap: num(&fields.chunk_overlap, d.chunk_overlap),
            strategy: fields
                .strategy
                .as_deref()
                .map(ParsingStrategy::from_form)
                .unwrap_or_default(),
        }
    });
    let staged = StagedUpload {
        index_name: index_name.clone(),
        filename,
        bytes: fields.bytes,
        content_type: fields
            .content_type
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        prechunk,
    };

    let client = match index_client(&st) {
        Ok(c) => c,
        Err(e) => return upload_page(&st.assets, &index_name, Some(&format!("{e:#}"))),
    };
    match upload::stage(st.backends.as_ref(), client.as_ref(), staged).await {
        Ok(_) => Redirect::to(&format!("/indexes/{}", index_path(&index_name))).into_response(),
        Err(e) => {
            tracing::warn!("upload to '{}' failed: {:#}", index_name, e);
            upload_page(&st.assets, &index_name, Some(&format!("{e:#}")))
        }
    }
}

pub async fn api_explorer<B: Backends>(State(st): State<AppState<B>>) -> Response {
    let options: String = OPERATIONS
        .iter()
        .map(|op| {
            format!(
                r#"<option value="{id}" data-backend="{role}">{role}: {name}</option>"#,
                id = op.id,
                role = op.role,
                name = escape(op.name)
            )
        })
        .collect();
    let mut operations = String::new();
    for op in OPERATIONS {
        operations.push_str(&format!(
            r#"<div class="card"><h3>{} <code>{}.{}</code></h3><p>{}</p>"#,
            escape(op.name),
            op.role,
            op.id,
            escape(op.description)
        ));
        if !op.params.is_empty() {
            operations.push_str("<ul>");
            for p in op.params {
                let default = p
                    .default
                    .map(|d| format!(", default {}", escape(d)))
                    .unwrap_or_default();
                operations.push_str(&format!(
                    "<li><code>{}</code> ({}{}{}): {}</li>",
                    p.name,
                    p.kind,
                    if p.required { ", required" } else { "" },
                    default,
                    escape(p.description)
                ));
            }
            operations.push_str("</ul>");
        }
        operations.push_str("</div>\n");
    }
    let body = st
        .assets
        .render("api_explorer", &[("OPTIONS", &options), ("OPERATIONS", &operations)]);
    page(&st.assets, "API Explorer", body)
}

fn chat_page<B: Backends>(
    st: &AppState<B>,
    selected: Option<&str>,
    indexes: &[IndexInfo],
    error: Option<&str>,
) -> Response {
    let settings = st.backends.settings().load();
    let model = Effective::resolve(&settings, st.backends.config()).chat_model;
    let options: String = indexes
        .iter()
        .map(|idx| {
            let sel = if Some(idx.name.as_str()) == selected { " selected" } else { "" };
            format!(
                r#"<option value="{n}"{sel}>{n}</option>"#,
                n = escape(&idx.name),
                sel = sel
            )
        })
        .collect();
    let body = st.assets.render(
        "chat",
        &[
            ("ERROR", &alert("error", error)),
            ("INDEX_NAME", &escape(selected.unwrap_or(""))),
            ("INDEX_OPTIONS", &options),
            ("CHAT_MODEL", &escape(&model)),
        ],
    );
    page(&st.assets, "Chat", body)
}

pub async fn chat_home<B: Backends>(State(st): State<AppState<B>>) -> Response {
    let listed = match index_client(&st) {
        Ok(c) => fetch_indexes(c.as_ref()).await,
        Err(e) => Err(format!("{e:#}")),
    };
    match listed {
        Ok(indexes) => chat_page(&st, None, &indexes, None),
        Err(e) => chat_page(&st, None, &[], Some(&e)),
    }
}

pub async fn chat_index<B: Backends>(
    State(st): State<AppState<B>>,
    Path(index_name): Path<String>,
) -> Response {
    let listed = match index_client(&st) {
        Ok(c) => fetch_indexes(c.as_ref()).await,
        Err(e) => Err(format!("{e:#}")),
    };
    match listed {
        Ok(indexes) if indexes.iter().any(|i| i.name == index_name) => {
            chat_page(&st, Some(&index_name), &indexes, None)
        }
        Ok(indexes) => {
            let msg = format!("Index '{}' not found", index_name);
            chat_page(&st, None, &indexes, Some(&msg))
        }
        Err(e) => chat_page(&st, Some(&index_name), &[], Some(&e)),
    }
}

fn settings_page(
    assets: &AssetBank,
    settings: &Settings,
    error: Option<&str>,
    success: Option<&str>,
) -> Response {
    let body = assets.render(
        "settings",
        &[
            ("ERROR", &alert("error", error)),
            ("SUCCESS", &alert("success", success)),
            ("BEARER_TOKEN", &escape(settings.bearer_token.as_deref().unwrap_or(""))),
            ("API_KEY", &escape(settings.api_key.as_deref().unwrap_or(""))),
            ("CHAT_MODEL", &escape(settings.chat_model.as_deref().unwrap_or(""))),
        ],
    );
    page(assets, "Settings", body)
}

pub async fn settings_form<B: Backends>(State(st): State<AppState<B>>) -> Response {
    let settings = st.backends.settings().load();
    settings_page(&st.assets, &settings, None, None)
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub chat_model: String,
}

pub async fn settings_submit<B: Backends>(
    State(st): State<AppState<B>>,
    Form(form): Form<SettingsForm>,
) -> Response {
    let settings = Settings::from_form(&form.bearer_token, &form.api_key, &form.chat_model);
    match st.backends.settings().save(&settings) {
        Ok(()) => settings_page(&st.assets, &settings, None, Some("Settings saved successfully!")),
        Err(e) => {
            tracing::error!("saving settings failed: {:#}", e);
            settings_page(&st.assets, &settings, Some("Failed to save settings."), None)
        }
    }
}

pub async fn static_asset<B: Backends>(
    State(st): State<AppState<B>>,
    Path(path): Path<String>,
) -> Response {
    let rel = format!("static/{}", path.trim_start_matches('/'));
    match st.assets.get(&rel) {
        Some(data) => {
            let mut resp = data.into_owned().into_response();
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(console_assets::content_type(&rel)),
            );
            resp
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
