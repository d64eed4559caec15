use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use super::auth_header::HeaderParseError;
use super::buffering::BodyReadError;
use super::credentials::ResolverError;
use super::replay_window::TimestampError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const REJECTED_MESSAGE: &str = "request authentication failed";
const UNAVAILABLE_MESSAGE: &str = "authentication service unavailable";

/// Why a request did not authenticate.
///
/// Client-side reasons all surface as the same 403 response; the variant is
/// only visible in logs. Credential store failures are server errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingAuthHeader,
    #[error("Malformed authorization header: {0}")]
    MalformedAuthHeader(#[from] HeaderParseError),
    #[error("Unknown access key")]
    UnknownAccessKey,
    #[error("Missing or unparsable signing timestamp")]
    MissingTimestamp,
    #[error("Signing timestamp outside replay window: {0}")]
    TimestampOutOfWindow(TimestampError),
    #[error("Signature mismatch")]
    SignatureMismatch,
    #[error("Request body unreadable: {0}")]
    BodyReadError(#[from] BodyReadError),
    #[error("Credential lookup timed out after {0:?}")]
    ResolverTimeout(Duration),
    #[error("Credential lookup failed: {0}")]
    ResolverFailure(#[from] ResolverError),
}

impl AuthError {
    /// Stable identifier for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "MissingAuthHeader",
            AuthError::MalformedAuthHeader(_) => "MalformedAuthHeader",
            AuthError::UnknownAccessKey => "UnknownAccessKey",
            AuthError::MissingTimestamp => "MissingTimestamp",
            AuthError::TimestampOutOfWindow(_) => "TimestampOutOfWindow",
            AuthError::SignatureMismatch => "SignatureMismatch",
            AuthError::BodyReadError(_) => "BodyReadError",
            AuthError::ResolverTimeout(_) => "ResolverTimeout",
            AuthError::ResolverFailure(_) => "ResolverFailure",
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::ResolverTimeout(_) | AuthError::ResolverFailure(_)
        )
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            AuthError::ResolverTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ResolverFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::FORBIDDEN,
        }
    }

    /// The text sent to the client. Deliberately identical for every client-side reason.
    pub fn public_message(&self) -> &'static str {
        if self.is_server_error() {
            UNAVAILABLE_MESSAGE
        } else {
            REJECTED_MESSAGE
        }
    }

    /// Builds the response, tagged with `request_id` so it can be matched to the log line.
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        let mut response = Response::new(Body::from(self.public_message()));
        *response.status_mut() = self.http_status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if let Ok(value) = HeaderValue::from_str(request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        self.into_response_with_id(&request_id)
    }
}
