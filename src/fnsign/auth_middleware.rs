use std::sync::Arc;

use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use chrono::Utc;
use tower::{Layer, Service};
use tracing::{error, warn};
use uuid::Uuid;

use super::auth_error::AuthError;
use super::buffering::ReplayableBody;
use super::pipeline::VerificationPipeline;

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    pipeline: Arc<VerificationPipeline>,
}

impl<S> AuthMiddleware<S> {
    pub fn new(inner: S, pipeline: Arc<VerificationPipeline>) -> Self {
        Self { inner, pipeline }
    }
}

impl<S> Service<Request> for AuthMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let pipeline = self.pipeline.clone();
        // The clone is not guaranteed ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // If the connection goes away this future is dropped: the inner
        // service is never called and the buffered body is freed with it.
        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let (mut parts, body) = req.into_parts();
            let now = Utc::now();

            // Header-only checks run before a single body byte is read.
            let pending = match pipeline.authorize(&parts, now).await {
                Ok(pending) => pending,
                Err(auth_error) => return Ok(reject(auth_error, &request_id)),
            };

            let body = match ReplayableBody::buffer(body, pipeline.settings().max_body_bytes).await
            {
                Ok(body) => body,
                Err(e) => return Ok(reject(AuthError::from(e), &request_id)),
            };

            match pipeline.finish(pending, &parts, &body) {
                Ok(verified) => {
                    parts.extensions.insert(verified);
                    let req = Request::from_parts(parts, body.into_body());
                    inner.call(req).await
                }
                Err(auth_error) => Ok(reject(auth_error, &request_id)),
            }
        })
    }
}

fn reject(auth_error: AuthError, request_id: &str) -> Response {
    if auth_error.is_server_error() {
        error!(
            request_id,
            reason = auth_error.code(),
            "Authentication unavailable: {}",
            auth_error
        );
    } else {
        warn!(
            request_id,
            reason = auth_error.code(),
            "Authentication failed: {}",
            auth_error
        );
    }

    auth_error.into_response_with_id(request_id)
}

#[derive(Clone)]
pub struct AuthLayer {
    pipeline: Arc<VerificationPipeline>,
}

impl AuthLayer {
    pub fn new(pipeline: Arc<VerificationPipeline>) -> Self {
        Self { pipeline }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware::new(inner, self.pipeline.clone())
    }
}
