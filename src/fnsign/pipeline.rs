//! Request verification.
//!
//! A request moves through the stages
//!
//! ```text
//! Start -> HeaderParsed -> CredentialResolved -> WindowChecked -> SignatureComputed -> Verified
//! ```
//!
//! and any failing stage short-circuits to a rejection without running the
//! stages after it. The cheap checks (header grammar, key lookup, clock skew)
//! all happen before any HMAC is computed. `authorize` covers the stages up
//! to the window check and never reads the body, so a caller can reject an
//! unauthenticated request before buffering anything; `finish` does the rest.

use std::sync::Arc;
use std::time::Duration;

use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

use super::auth_error::AuthError;
use super::auth_header::{AuthorizationHeaderValue, HeaderParseError};
use super::buffering::{ReplayableBody, DEFAULT_MAX_BODY_BYTES};
use super::canonical::Canonicalizer;
use super::credentials::{Credential, CredentialResolver};
use super::replay_window::{parse_timestamp, ReplayWindow, TIMESTAMP_HEADER};
use super::signer::{HmacSha256Signer, SignatureComputer, SigningContext};

pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub canonicalizer: Canonicalizer,
    pub replay_window: ReplayWindow,
    pub resolver_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            canonicalizer: Canonicalizer::default(),
            replay_window: ReplayWindow::default(),
            resolver_timeout: DEFAULT_RESOLVER_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Identity established for a verified request.
///
/// Inserted into the request extensions before the downstream handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest {
    pub access_key_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A request that passed every header-only stage and still needs its
/// signature checked against the body.
#[derive(Debug)]
pub struct PendingVerification {
    header: AuthorizationHeaderValue,
    credential: Credential,
    raw_timestamp: String,
    timestamp: DateTime<Utc>,
}

impl PendingVerification {
    pub fn access_key_id(&self) -> &str {
        &self.header.access_key_id
    }
}

pub struct VerificationPipeline {
    resolver: Arc<dyn CredentialResolver>,
    signer: Arc<dyn SignatureComputer>,
    settings: PipelineSettings,
}

impl VerificationPipeline {
    pub fn new(resolver: Arc<dyn CredentialResolver>, settings: PipelineSettings) -> Self {
        Self::with_signer(resolver, Arc::new(HmacSha256Signer), settings)
    }

    pub fn with_signer(
        resolver: Arc<dyn CredentialResolver>,
        signer: Arc<dyn SignatureComputer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver,
            signer,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs every stage against an already buffered body.
    #[instrument(
        name = "verify_request",
        skip_all,
        fields(method = %parts.method, path = %parts.uri.path())
    )]
    pub async fn verify(
        &self,
        parts: &Parts,
        body: &ReplayableBody,
        now: DateTime<Utc>,
    ) -> Result<VerifiedRequest, AuthError> {
        let pending = self.authorize(parts, now).await?;
        self.finish(pending, parts, body)
    }

    /// The stages that only need headers: header grammar, credential lookup
    /// and the replay window. Nothing here touches the body or computes an HMAC.
    #[instrument(
        name = "authorize_request",
        skip_all,
        fields(method = %parts.method, path = %parts.uri.path())
    )]
    pub async fn authorize(
        &self,
        parts: &Parts,
        now: DateTime<Utc>,
    ) -> Result<PendingVerification, AuthError> {
        let header = parse_authorization(&parts.headers)?;
        debug!(access_key_id = %header.access_key_id, "header parsed");

        let credential = self.resolve_credential(&header.access_key_id).await?;
        debug!("credential resolved");

        let (raw_timestamp, timestamp) = self.check_window(&parts.headers, now)?;
        debug!(timestamp = %raw_timestamp, "timestamp within window");

        Ok(PendingVerification {
            raw_timestamp: raw_timestamp.to_string(),
            header,
            credential,
            timestamp,
        })
    }

    /// Recomputes the signature over the buffered body and compares it.
    pub fn finish(
        &self,
        pending: PendingVerification,
        parts: &Parts,
        body: &ReplayableBody,
    ) -> Result<VerifiedRequest, AuthError> {
        let PendingVerification {
            header,
            credential,
            raw_timestamp,
            timestamp,
        } = pending;

        let context = self.signing_context(parts, body, &raw_timestamp, credential);
        debug!(canonical_request = ?context.canonical_request(), "signature computed");

        compare_signatures(&context, &header)?;

        info!(access_key_id = %header.access_key_id, "request verified");
        Ok(VerifiedRequest {
            access_key_id: header.access_key_id,
            timestamp,
        })
    }

    async fn resolve_credential(&self, access_key_id: &str) -> Result<Credential, AuthError> {
        let timeout = self.settings.resolver_timeout;

        match tokio::time::timeout(timeout, self.resolver.lookup(access_key_id)).await {
            Ok(Ok(Some(credential))) => Ok(credential),
            Ok(Ok(None)) => Err(AuthError::UnknownAccessKey),
            Ok(Err(e)) => {
                warn!("credential lookup failed: {}", e);
                Err(AuthError::ResolverFailure(e))
            }
            Err(_) => {
                warn!("credential lookup timed out after {:?}", timeout);
                Err(AuthError::ResolverTimeout(timeout))
            }
        }
    }

    fn check_window<'a>(
        &self,
        headers: &'a HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<(&'a str, DateTime<Utc>), AuthError> {
        let raw = headers
            .get(TIMESTAMP_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingTimestamp)?;

        let timestamp = parse_timestamp(raw).map_err(|_| AuthError::MissingTimestamp)?;

        self.settings
            .replay_window
            .check(timestamp, now)
            .map_err(AuthError::TimestampOutOfWindow)?;

        Ok((raw, timestamp))
    }

    fn signing_context(
        &self,
        parts: &Parts,
        body: &ReplayableBody,
        timestamp: &str,
        credential: Credential,
    ) -> SigningContext {
        SigningContext::build(
            &self.settings.canonicalizer,
            self.signer.as_ref(),
            parts.method.as_str(),
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
            body.digest(),
            timestamp,
            credential,
        )
    }
}

fn parse_authorization(headers: &HeaderMap) -> Result<AuthorizationHeaderValue, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::MalformedAuthHeader(HeaderParseError::InvalidScheme))?;

    Ok(value.parse::<AuthorizationHeaderValue>()?)
}

fn compare_signatures(
    context: &SigningContext,
    header: &AuthorizationHeaderValue,
) -> Result<(), AuthError> {
    let matches: bool = context
        .signature()
        .as_bytes()
        .ct_eq(header.signature.as_bytes())
        .into();

    if !matches {
        return Err(AuthError::SignatureMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnsign::credentials::{ResolverError, StaticCredentialStore};
    use async_trait::async_trait;
    use axum::http::Request;

    struct FailingResolver;

    #[async_trait]
    impl CredentialResolver for FailingResolver {
        async fn lookup(&self, _: &str) -> Result<Option<Credential>, ResolverError> {
            Err(ResolverError::Unavailable("connection refused".to_string()))
        }
    }

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().method("GET").uri("/orders?status=open");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn now() -> DateTime<Utc> {
        parse_timestamp("20240101T120005Z").unwrap()
    }

    #[tokio::test]
    async fn test_missing_header() {
        let store = Arc::new(StaticCredentialStore::new());
        let pipeline = VerificationPipeline::new(store, PipelineSettings::default());

        let result = pipeline
            .verify(&parts(&[]), &ReplayableBody::default(), now())
            .await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn test_resolver_failure_is_server_error() {
        let pipeline =
            VerificationPipeline::new(Arc::new(FailingResolver), PipelineSettings::default());
        let header = format!("FNSIGN AccessKeyId=AKID1,Signature={}", "0".repeat(64));

        let result = pipeline
            .verify(
                &parts(&[("authorization", &header)]),
                &ReplayableBody::default(),
                now(),
            )
            .await;

        let error = result.unwrap_err();
        assert!(matches!(error, AuthError::ResolverFailure(_)));
        assert!(error.is_server_error());
    }

    #[tokio::test]
    async fn test_missing_timestamp_after_resolution() {
        let store = Arc::new(
            StaticCredentialStore::from_credentials(vec![Credential::new("AKID1", "s3cr3t").unwrap()])
                .unwrap(),
        );
        let pipeline = VerificationPipeline::new(store, PipelineSettings::default());
        let header = format!("FNSIGN AccessKeyId=AKID1,Signature={}", "0".repeat(64));

        for timestamp in [None, Some("2024-01-01T12:00:00Z")] {
            let mut headers = vec![("authorization", header.as_str())];
            if let Some(timestamp) = timestamp {
                headers.push((TIMESTAMP_HEADER, timestamp));
            }

            let result = pipeline
                .verify(&parts(&headers), &ReplayableBody::default(), now())
                .await;
            assert!(matches!(result, Err(AuthError::MissingTimestamp)));
        }
    }
}
