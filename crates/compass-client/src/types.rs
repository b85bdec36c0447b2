// file: src/types.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chunks_per_doc: Option<u32>,
    /// Any other knob the service accepts, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndexConfig {
    pub fn with_max_chunks(max_chunks_per_doc: u32) -> Self {
        Self {
            max_chunks_per_doc: Some(max_chunks_per_doc),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parser-side PDF handling. Absent means "let the parser decide".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PdfParsingStrategy {
    QuickText,
    ImageToMarkdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_parsing_strategy: Option<PdfParsingStrategy>,
    pub num_tokens_per_chunk: u32,
    pub num_tokens_overlap: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            pdf_parsing_strategy: None,
            num_tokens_per_chunk: 500,
            num_tokens_overlap: 15,
        }
    }
}

/// A document as produced by the parser, ready for bulk insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub chunks: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed(ParsedDocument),
    Failed { filename: String, error: String },
}

impl ParseOutcome {
    /// Split a batch into parsed documents and `(filename, error)` pairs.
    pub fn partition(outcomes: Vec<ParseOutcome>) -> (Vec<ParsedDocument>, Vec<(String, String)>) {
        let mut docs = Vec::new();
        let mut failed = Vec::new();
        for o in outcomes {
            match o {
                ParseOutcome::Parsed(d) => docs.push(d),
                ParseOutcome::Failed { filename, error } => failed.push((filename, error)),
            }
        }
        (docs, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_config_passes_unknown_keys() {
        let cfg: IndexConfig =
            serde_json::from_value(json!({ "max_chunks_per_doc": 100, "number_of_shards": 2 }))
                .unwrap();
        assert_eq!(cfg.max_chunks_per_doc, Some(100));
        let back = serde_json::to_value(&cfg).unwrap();
        assert_eq!(back["number_of_shards"], 2);
    }

    #[test]
    fn default_strategy_is_not_sent() {
        let v = serde_json::to_value(ParserConfig::default()).unwrap();
        assert!(v.get("pdf_parsing_strategy").is_none());
        let v = serde_json::to_value(ParserConfig {
            pdf_parsing_strategy: Some(PdfParsingStrategy::ImageToMarkdown),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(v["pdf_parsing_strategy"], "ImageToMarkdown");
    }

    #[test]
    fn partition_keeps_order() {
        let outcomes = vec![
            ParseOutcome::Parsed(ParsedDocument { filename: "a.pdf".into(), ..Default::default() }),
            ParseOutcome::Failed { filename: "b.bin".into(), error: "unsupported".into() },
            ParseOutcome::Parsed(ParsedDocument { filename: "c.txt".into(), ..Default::default() }),
        ];
        let (docs, failed) = ParseOutcome::partition(outcomes);
        assert_eq!(docs.iter().map(|d| d.filename.as_str()).collect::<Vec<_>>(), ["a.pdf", "c.txt"]);
        assert_eq!(failed, vec![("b.bin".to_string(), "unsupported".to_string())]);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let v = serde_json::to_value(ParseOutcome::Failed {
            filename: "x".into(),
            error: "bad".into(),
        })
        .unwrap();
        assert_eq!(v, json!({ "status": "failed", "filename": "x", "error": "bad" }));
    }
}
