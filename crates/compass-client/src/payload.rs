// file: src/payload.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::IndexInfo;

/// Envelope around whatever the index service answered.
///
/// The service does not describe its own shape: search answers carry `hits`,
/// older deployments wrap everything into `result`, bulk operations report
/// `documents`. Known fields are lifted into accessors, everything else stays
/// in `extra` so a later dump still sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponsePayload {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Wrap a decoded response body. An object-valued `result` becomes the
    /// `result` accessor and the remaining top-level keys go to `extra`;
    /// any other body is kept whole under `result`. A top-level `hits` array
    /// is exposed as the `hits` accessor.
    pub fn from_body(body: Value) -> Self {
        let hits = body.get("hits").and_then(|h| h.as_array()).cloned();
        let error = body
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        match body {
            Value::Object(mut map) if map.get("result").is_some_and(Value::is_object) => {
                let result = map.remove("result");
                map.remove("hits");
                map.remove("error");
                Self {
                    error,
                    result,
                    hits,
                    extra: map,
                }
            }
            body => Self {
                error,
                result: Some(body),
                hits,
                extra: Map::new(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Plain JSON view of the whole envelope.
    pub fn dump(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Indexes listed by a `list_indexes` answer (`result.indexes` or a
    /// top-level `indexes`). Entries without a name are skipped.
    pub fn indexes(&self) -> Vec<IndexInfo> {
        let list = self
            .result
            .as_ref()
            .and_then(|r| r.get("indexes"))
            .or_else(|| self.extra.get("indexes"))
            .and_then(|v| v.as_array());
        let Some(list) = list else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|v| serde_json::from_value::<IndexInfo>(v.clone()).ok())
            .collect()
    }
}
