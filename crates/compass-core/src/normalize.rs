// file: src/normalize.rs
//
// The index service answers search and list calls in several shapes depending
// on version and operation. Shapes are probed in a fixed order and the first
// non-empty collection wins; nothing here ever fails.

use compass_client::ResponsePayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One document/chunk as shown to users and handed to the chat model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SearchHit {
    pub fn from_raw(raw: &Value) -> Self {
        let text = raw
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| match raw.get("content") {
                Some(Value::String(s)) => Some(s.as_str()),
                Some(c) => c.get("text").and_then(Value::as_str),
                None => None,
            })
            .map(str::to_string);
        let document_id = raw
            .get("document_id")
            .or_else(|| raw.get("documentId"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let score = raw.get("score").and_then(Value::as_f64);
        Self {
            text,
            document_id,
            score,
        }
    }
}

/// Read access to the places a hit collection may live.
pub trait Probe {
    /// Directly exposed `hits`.
    fn hits(&self) -> Option<&[Value]>;
    /// Nested `result` value, if any.
    fn result(&self) -> Option<&Value>;
    /// Top-level `documents`.
    fn documents(&self) -> Option<&[Value]>;
    /// Plain JSON form for a last re-probe; `None` when already plain.
    fn dump(&self) -> Option<Value>;
}

fn array_at<'a>(v: &'a Value, key: &str) -> Option<&'a [Value]> {
    v.get(key).and_then(Value::as_array).map(Vec::as_slice)
}

impl Probe for Value {
    fn hits(&self) -> Option<&[Value]> {
        array_at(self, "hits")
    }

    fn result(&self) -> Option<&Value> {
        self.get("result")
    }

    fn documents(&self) -> Option<&[Value]> {
        array_at(self, "documents")
    }

    fn dump(&self) -> Option<Value> {
        None
    }
}

impl Probe for ResponsePayload {
    fn hits(&self) -> Option<&[Value]> {
        self.hits.as_deref()
    }

    fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    fn documents(&self) -> Option<&[Value]> {
        self.extra
            .get("documents")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    fn dump(&self) -> Option<Value> {
        Some(ResponsePayload::dump(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Hits,
    ResultHits,
    ResultDocuments,
    Documents,
}

impl ResponseShape {
    pub const PRIORITY: [ResponseShape; 4] = [
        ResponseShape::Hits,
        ResponseShape::ResultHits,
        ResponseShape::ResultDocuments,
        ResponseShape::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseShape::Hits => "hits",
            ResponseShape::ResultHits => "result.hits",
            ResponseShape::ResultDocuments => "result.documents",
            ResponseShape::Documents => "documents",
        }
    }

    fn extract<'a, P: Probe + ?Sized>(self, payload: &'a P) -> Option<&'a [Value]> {
        match self {
            ResponseShape::Hits => payload.hits(),
            ResponseShape::ResultHits => payload.result().and_then(|r| array_at(r, "hits")),
            ResponseShape::ResultDocuments => {
                payload.result().and_then(|r| array_at(r, "documents"))
            }
            ResponseShape::Documents => payload.documents(),
        }
    }
}

/// First shape (in priority order) holding a non-empty collection.
pub fn detect<P: Probe + ?Sized>(payload: &P) -> Option<(ResponseShape, &[Value])> {
    ResponseShape::PRIORITY.into_iter().find_map(|shape| {
        shape
            .extract(payload)
            .filter(|raw| !raw.is_empty())
            .map(|raw| (shape, raw))
    })
}

pub fn normalize<P: Probe + ?Sized>(payload: &P) -> Vec<SearchHit> {
    if let Some((shape, raw)) = detect(payload) {
        tracing::debug!("normalize: {} hit(s) from {}", raw.len(), shape.as_str());
        return raw.iter().map(SearchHit::from_raw).collect();
    }
    if let Some(dump) = payload.dump() {
        if let Some((shape, raw)) = detect(&dump) {
            tracing::debug!(
                "normalize: {} hit(s) from dumped {}",
                raw.len(),
                shape.as_str()
            );
            return raw.iter().map(SearchHit::from_raw).collect();
        }
    }
    tracing::debug!("normalize: no known response shape");
    Vec::new()
}
