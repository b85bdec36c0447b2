// file: src/registry.rs
//
// Operations reachable through the API explorer. Every entry names its
// backend, documents its parameters and owns a typed argument decoder, so a
// name that is not listed here can never reach a client.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use base64::Engine;
use compass_client::{DocumentUpload, IndexConfig, IndexClient, ParserClient};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    Compass,
    Parser,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendRole::Compass => "compass",
            BackendRole::Parser => "parser",
        }
    }
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendRole {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compass" => Ok(BackendRole::Compass),
            "parser" => Ok(BackendRole::Parser),
            other => Err(RelayError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub description: &'static str,
}

#[derive(Clone, Copy, Serialize)]
pub struct OperationSpec {
    pub role: BackendRole,
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    #[serde(skip)]
    decoder: fn(Value) -> serde_json::Result<Call>,
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("role", &self.role)
            .field("id", &self.id)
            .finish()
    }
}

impl OperationSpec {
    /// Missing or `null` arguments decode as an empty object.
    pub fn decode(&self, args: Value) -> Result<Call, RelayError> {
        let args = match args {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        (self.decoder)(args).map_err(|e| RelayError::InvalidArguments {
            operation: self.id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIndexArgs {
    pub index_name: String,
    #[serde(default)]
    pub index_config: Option<IndexConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub index_name: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}
fn default_top_k() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadArgs {
    pub index_name: String,
    pub filename: String,
    #[serde(deserialize_with = "base64_bytes")]
    pub filebytes: Vec<u8>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub document_id: Option<String>,
}
fn default_content_type() -> String {
    "application/octet-stream".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessFolderArgs {
    pub folder_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

fn base64_bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    base64::engine::general_purpose::STANDARD
        .decode(s.trim())
        .map_err(serde::de::Error::custom)
}

/// A resolved, argument-checked invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListIndexes,
    CreateIndex(CreateIndexArgs),
    SearchDocuments(SearchArgs),
    UploadDocument(UploadArgs),
    ProcessFolder(ProcessFolderArgs),
}

impl Call {
    pub fn role(&self) -> BackendRole {
        match self {
            Call::ProcessFolder(_) => BackendRole::Parser,
            _ => BackendRole::Compass,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Call::ListIndexes => "list_indexes",
            Call::CreateIndex(_) => "create_index",
            Call::SearchDocuments(_) => "search_documents",
            Call::UploadDocument(_) => "upload_document",
            Call::ProcessFolder(_) => "process_folder",
        }
    }

    /// One attempt against the index service. An `error` in the answer
    /// counts as a failed attempt.
    pub async fn execute_index(&self, client: &dyn IndexClient) -> anyhow::Result<Value> {
        let payload = match self {
            Call::ListIndexes => client.list_indexes().await?,
            Call::CreateIndex(a) => {
                let config = a.index_config.clone().unwrap_or_default();
                client.create_index(&a.index_name, &config).await?
            }
            Call::SearchDocuments(a) => {
                client
                    .search_documents(&a.index_name, &a.query, a.top_k)
                    .await?
            }
            Call::UploadDocument(a) => {
                client
                    .upload_document(DocumentUpload {
                        index_name: a.index_name.clone(),
                        filename: a.filename.clone(),
                        bytes: a.filebytes.clone(),
                        content_type: a.content_type.clone(),
                        document_id: a.document_id.clone(),
                    })
                    .await?
            }
            Call::ProcessFolder(_) => anyhow::bail!("process_folder needs the parser client"),
        };
        if let Some(err) = &payload.error {
            anyhow::bail!("{err}");
        }
        Ok(payload.dump())
    }

    pub async fn execute_parser(&self, client: &dyn ParserClient) -> anyhow::Result<Value> {
        match self {
            Call::ProcessFolder(a) => {
                let outcomes = client.process_folder(&a.folder_path).await?;
                Ok(serde_json::to_value(outcomes)?)
            }
            other => anyhow::bail!("{} needs the compass client", other.operation()),
        }
    }
}

fn decode_list(v: Value) -> serde_json::Result<Call> {
    serde_json::from_value::<NoArgs>(v).map(|_| Call::ListIndexes)
}
fn decode_create(v: Value) -> serde_json::Result<Call> {
    serde_json::from_value(v).map(Call::CreateIndex)
}
fn decode_search(v: Value) -> serde_json::Result<Call> {
    serde_json::from_value(v).map(Call::SearchDocuments)
}
fn decode_upload(v: Value) -> serde_json::Result<Call> {
    serde_json::from_value(v).map(Call::UploadDocument)
}
fn decode_process_folder(v: Value) -> serde_json::Result<Call> {
    serde_json::from_value(v).map(Call::ProcessFolder)
}

pub static OPERATIONS: &[OperationSpec] = &[
    OperationSpec {
        role: BackendRole::Compass,
        id: "list_indexes",
        name: "List Indexes",
        description: "Retrieve a list of all indexes.",
        params: &[],
        decoder: decode_list,
    },
    OperationSpec {
        role: BackendRole::Compass,
        id: "create_index",
        name: "Create Index",
        description: "Create a new index with the specified configuration.",
        params: &[
            ParamSpec {
                name: "index_name",
                kind: "string",
                required: true,
                default: None,
                description: "Name of the index to create.",
            },
            ParamSpec {
                name: "index_config",
                kind: "object",
                required: false,
                default: None,
                description: "Configuration for the index (JSON object). Example: {\"max_chunks_per_doc\": 100}",
            },
        ],
        decoder: decode_create,
    },
    OperationSpec {
        role: BackendRole::Compass,
        id: "search_documents",
        name: "Search Documents",
        description: "Search for documents in an index using a query.",
        params: &[
            ParamSpec {
                name: "index_name",
                kind: "string",
                required: true,
                default: None,
                description: "Name of the index to search.",
            },
            ParamSpec {
                name: "query",
                kind: "string",
                required: true,
                default: None,
                description: "The search query.",
            },
            ParamSpec {
                name: "top_k",
                kind: "integer",
                required: false,
                default: Some("10"),
                description: "Number of results to return.",
            },
        ],
        decoder: decode_search,
    },
    OperationSpec {
        role: BackendRole::Compass,
        id: "upload_document",
        name: "Upload Document",
        description: "Upload a document to an index.",
        params: &[
            ParamSpec {
                name: "index_name",
                kind: "string",
                required: true,
                default: None,
                description: "Name of the index to upload to.",
            },
            ParamSpec {
                name: "filename",
                kind: "string",
                required: true,
                default: None,
                description: "Name of the file.",
            },
            ParamSpec {
                name: "filebytes",
                kind: "string",
                required: true,
                default: None,
                description: "Base64 encoded file content.",
            },
            ParamSpec {
                name: "content_type",
                kind: "string",
                required: false,
                default: Some("application/octet-stream"),
                description: "Content type of the file.",
            },
            ParamSpec {
                name: "document_id",
                kind: "string",
                required: false,
                default: None,
                description: "Custom ID for the document.",
            },
        ],
        decoder: decode_upload,
    },
    OperationSpec {
        role: BackendRole::Parser,
        id: "process_folder",
        name: "Process Folder (Parser)",
        description: "Process all documents in a folder (Parser client only).",
        params: &[ParamSpec {
            name: "folder_path",
            kind: "string",
            required: true,
            default: None,
            description: "Path to the folder containing documents.",
        }],
        decoder: decode_process_folder,
    },
];

pub fn lookup(role: BackendRole, operation: &str) -> Option<&'static OperationSpec> {
    OPERATIONS
        .iter()
        .find(|op| op.role == role && op.id == operation)
}

pub fn resolve(role: BackendRole, operation: &str, args: Value) -> Result<Call, RelayError> {
    let spec = lookup(role, operation).ok_or_else(|| RelayError::UnknownOperation {
        backend: role,
        operation: operation.to_string(),
    })?;
    spec.decode(args)
}
