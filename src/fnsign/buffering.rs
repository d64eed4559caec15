use std::sync::OnceLock;

use axum::body::Body;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use thiserror::Error;
use tracing::error;

use super::canonical::body_digest;

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum BodyReadError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("failed to read request body: {0}")]
    Read(String),
}

/// A fully buffered request body that can be read for digesting and then
/// handed, unconsumed, to the downstream handler.
#[derive(Debug, Default)]
pub struct ReplayableBody {
    bytes: Bytes,
    digest: OnceLock<String>,
}

impl ReplayableBody {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            digest: OnceLock::new(),
        }
    }

    /// Collects `body`, failing if it is larger than `limit` bytes.
    pub async fn buffer(body: Body, limit: usize) -> Result<Self, BodyReadError> {
        let collected = Limited::new(body, limit).collect().await.map_err(|e| {
            if e.is::<http_body_util::LengthLimitError>() {
                BodyReadError::TooLarge(limit)
            } else {
                error!("Failed to collect request body: {}", e);
                BodyReadError::Read(e.to_string())
            }
        })?;

        Ok(Self::from_bytes(collected.to_bytes()))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 hex digest, computed on first use.
    pub fn digest(&self) -> &str {
        self.digest.get_or_init(|| body_digest(&self.bytes))
    }

    /// A fresh body positioned at the start of the original content.
    pub fn to_body(&self) -> Body {
        Body::from(self.bytes.clone())
    }

    pub fn into_body(self) -> Body {
        Body::from(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnsign::canonical::EMPTY_BODY_SHA256;

    #[tokio::test]
    async fn test_buffer_and_replay() {
        let body = ReplayableBody::buffer(Body::from("hello"), 1024).await.unwrap();
        assert_eq!(body.bytes(), b"hello");

        let first = body.to_body().collect().await.unwrap().to_bytes();
        let second = body.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(first, "hello");
        assert_eq!(second, "hello");
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let result = ReplayableBody::buffer(Body::from(vec![0u8; 16]), 8).await;
        assert!(matches!(result, Err(BodyReadError::TooLarge(8))));
    }

    #[test]
    fn test_digest_of_empty_body() {
        let body = ReplayableBody::default();
        assert!(body.is_empty());
        assert_eq!(body.digest(), EMPTY_BODY_SHA256);
    }

    #[test]
    fn test_digest_is_memoized() {
        let body = ReplayableBody::from_bytes(r#"{"item":"book"}"#);
        let first = body.digest() as *const str;
        let second = body.digest() as *const str;
        assert_eq!(first, second);
        assert_eq!(
            body.digest(),
            "4ddc693ce39779d2725b70213ef414e8020b7bda853b0b22fe09354deadb2898"
        );
    }
}
