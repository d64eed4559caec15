use axum::http::{header, HeaderValue, Request};
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::auth_header::AuthorizationHeaderValue;
use super::canonical::{body_digest, Canonicalizer};
use super::credentials::Credential;
use super::replay_window::{format_timestamp, TIMESTAMP_HEADER};
use super::signer::sign;

#[derive(Error, Debug)]
pub enum SignRequestError {
    #[error("signed header value is not valid: {0}")]
    InvalidHeaderValue(#[from] axum::http::header::InvalidHeaderValue),
}

/// Headers a client attaches to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: AuthorizationHeaderValue,
    pub timestamp: String,
}

/// Signs the given request components at time `now`.
pub fn sign_parts(
    canonicalizer: &Canonicalizer,
    credential: &Credential,
    method: &str,
    path: &str,
    query: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let timestamp = format_timestamp(now);
    let canonical_request = canonicalizer.build(method, path, query, &body_digest(body));
    let signature = sign(
        credential.secret_key(),
        &timestamp,
        credential.access_key_id(),
        &canonical_request,
    );

    SignedHeaders {
        authorization: AuthorizationHeaderValue::new(credential.access_key_id(), signature),
        timestamp,
    }
}

/// Adds `x-feiniubus-date` and `Authorization` to `request`.
///
/// `body` must be the exact bytes that will be sent.
pub fn sign_request<B>(
    request: &mut Request<B>,
    body: &[u8],
    credential: &Credential,
    now: DateTime<Utc>,
) -> Result<(), SignRequestError> {
    sign_request_with(&Canonicalizer::default(), request, body, credential, now)
}

/// Same as [`sign_request`], for servers that canonicalize paths differently.
pub fn sign_request_with<B>(
    canonicalizer: &Canonicalizer,
    request: &mut Request<B>,
    body: &[u8],
    credential: &Credential,
    now: DateTime<Utc>,
) -> Result<(), SignRequestError> {
    let signed = sign_parts(
        canonicalizer,
        credential,
        request.method().as_str(),
        request.uri().path(),
        request.uri().query().unwrap_or(""),
        body,
        now,
    );

    let headers = request.headers_mut();
    headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&signed.timestamp)?);
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&signed.authorization.to_string())?,
    );

    Ok(())
}
