// file: src/upload.rs
use std::path::{Path, PathBuf};

use anyhow::Context;
use compass_client::{
    DocumentUpload, IndexClient, ParseOutcome, ParsedDocument, ParserConfig, PdfParsingStrategy,
    ResponsePayload,
};

use crate::backend::Backends;

/// Strategy names as they arrive from the upload form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParsingStrategy {
    #[default]
    Default,
    ImageToMarkdown,
    TextExtraction,
}

impl ParsingStrategy {
    /// Unknown names fall back to `Default`.
    pub fn from_form(s: &str) -> Self {
        match s.trim() {
            "image_to_markdown" => ParsingStrategy::ImageToMarkdown,
            "text_extraction" => ParsingStrategy::TextExtraction,
            _ => ParsingStrategy::Default,
        }
    }

    pub fn to_wire(self) -> Option<PdfParsingStrategy> {
        match self {
            ParsingStrategy::Default => None,
            ParsingStrategy::ImageToMarkdown => Some(PdfParsingStrategy::ImageToMarkdown),
            ParsingStrategy::TextExtraction => Some(PdfParsingStrategy::QuickText),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prechunk {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub strategy: ParsingStrategy,
}

impl Default for Prechunk {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            strategy: ParsingStrategy::Default,
        }
    }
}

impl Prechunk {
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            pdf_parsing_strategy: self.strategy.to_wire(),
            num_tokens_per_chunk: self.chunk_size,
            num_tokens_overlap: self.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub index_name: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub prechunk: Option<Prechunk>,
}

/// Removes the scratch copy when dropped, whatever happened in between.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            tracing::debug!("scratch cleanup {}: {}", self.0.display(), e);
        }
    }
}

/// Last path component only; the scratch file lives directly in the
/// shared upload dir, so same-named concurrent uploads collide.
fn scratch_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload.bin".to_string())
}

/// Push one uploaded file into an index, either as-is or through the
/// parser first. A payload `error` is turned into `Err`.
pub async fn stage<B: Backends + ?Sized>(
    backends: &B,
    index: &dyn IndexClient,
    upload: StagedUpload,
) -> anyhow::Result<ResponsePayload> {
    let payload = match upload.prechunk.clone() {
        None => {
            let document_id = uuid::Uuid::new_v4().to_string();
            tracing::info!(
                "upload {} ({} bytes) to '{}' as {}",
                upload.filename,
                upload.bytes.len(),
                upload.index_name,
                document_id
            );
            index
                .upload_document(DocumentUpload {
                    index_name: upload.index_name,
                    filename: upload.filename,
                    bytes: upload.bytes,
                    content_type: upload.content_type,
                    document_id: Some(document_id),
                })
                .await?
        }
        Some(pre) => {
            let docs = parse_scratch(backends, &upload, &pre)
                .await
                .context("Parser error")?;
            if docs.is_empty() {
                anyhow::bail!("No documents were successfully parsed");
            }
            tracing::info!(
                "inserting {} parsed document(s) into '{}'",
                docs.len(),
                upload.index_name
            );
            index.insert_docs(&upload.index_name, docs).await?
        }
    };

    if let Some(err) = payload.error.as_deref().filter(|e| !e.is_empty()) {
        anyhow::bail!("{}", err);
    }
    Ok(payload)
}

async fn parse_scratch<B: Backends + ?Sized>(
    backends: &B,
    upload: &StagedUpload,
    pre: &Prechunk,
) -> anyhow::Result<Vec<ParsedDocument>> {
    let parser = backends.parser_client(pre.parser_config())?;

    let dir = backends.config().storage.upload_dir.clone();
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(scratch_name(&upload.filename));
    tokio::fs::write(&path, &upload.bytes)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    let scratch = ScratchFile(path);

    let outcomes = parser.process_folder(&dir).await?;
    drop(scratch);

    let (docs, failed) = ParseOutcome::partition(outcomes);
    for (filename, error) in &failed {
        tracing::warn!("failed to parse {}: {}", filename, error);
    }
    Ok(docs)
}
