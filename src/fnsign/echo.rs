use axum::body::Bytes;
use axum::http::{Method, Uri};
use axum::response::Json;
use axum::Extension;
use serde::Serialize;
use tracing::debug;

use super::canonical::body_digest;
use super::pipeline::VerifiedRequest;

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub access_key_id: String,
    pub method: String,
    pub path: String,
    pub body_length: usize,
    pub body_sha256: String,
}

/// Reports who the request was authenticated as and what body reached the handler.
pub async fn handle(
    Extension(verified): Extension<VerifiedRequest>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Json<EchoResponse> {
    debug!(
        "echo for {} {} ({} bytes)",
        method,
        uri.path(),
        body.len()
    );

    Json(EchoResponse {
        access_key_id: verified.access_key_id,
        method: method.to_string(),
        path: uri.path().to_string(),
        body_length: body.len(),
        body_sha256: body_digest(&body),
    })
}

pub async fn health() -> &'static str {
    "ok"
}
