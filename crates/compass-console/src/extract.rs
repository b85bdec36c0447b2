// file: src/extract.rs
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use serde::Serialize;
use serde_json::json;

// Тело explorer'а и чата: браузеры и curl шлют что угодно, кодировку угадываем
pub struct JsonAnyEncoding<T>(pub T);

/// JSON reply with an explicit `charset=utf-8`; non-ASCII index names and
/// model output go out unescaped.
pub struct JsonReply<T>(pub T);

const JSON_UTF8: &str = "application/json; charset=utf-8";

impl<T: Serialize> IntoResponse for JsonReply<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => ([(header::CONTENT_TYPE, JSON_UTF8)], body).into_response(),
            Err(e) => {
                tracing::error!("reply serialization failed: {}", e);
                let body = json!({ "error": e.to_string() }).to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, JSON_UTF8)],
                    body,
                )
                    .into_response()
            }
        }
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonAnyEncoding<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| reject(format!("read body: {e}")))?;

        let text = request_text(&bytes);
        let val = serde_json::from_str::<T>(&text).map_err(|e| {
            tracing::debug!("rejected request body: {}", e);
            reject("Invalid request".to_string())
        })?;
        Ok(JsonAnyEncoding(val))
    }
}

fn reject(error: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        JsonReply(json!({ "success": false, "error": error })),
    )
        .into_response()
}

/// Request body as text: a BOM wins, then UTF-8, then whatever chardetng
/// guesses for a legacy single-byte page.
fn request_text(bytes: &[u8]) -> String {
    if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
        return enc.decode_without_bom_handling(&bytes[bom_len..]).0.into_owned();
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let mut det = EncodingDetector::new();
    det.feed(bytes, true);
    det.guess(None, true).decode_without_bom_handling(bytes).0.into_owned()
}
