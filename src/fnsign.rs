pub mod auth_error;
pub mod auth_header;
pub mod auth_middleware;
pub mod buffering;
pub mod canonical;
pub mod credentials;
mod echo;
pub mod pipeline;
pub mod replay_window;
pub mod sign_request;
pub mod signer;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use serde::Deserialize;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use auth_middleware::AuthLayer;
use buffering::DEFAULT_MAX_BODY_BYTES;
use canonical::Canonicalizer;
use credentials::{Credential, CredentialError, StaticCredentialStore};
use pipeline::{PipelineSettings, VerificationPipeline, DEFAULT_RESOLVER_TIMEOUT};
use replay_window::{ReplayWindow, DEFAULT_TOLERANCE_SECS};

#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    pub access_key_id: String,
    pub secret_key: String,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub address: String,
    pub port: u16,
    pub credentials: Vec<CredentialConfig>,
    /// Accepted clock skew between client and server, in seconds.
    pub replay_tolerance_secs: u64,
    pub resolver_timeout_ms: u64,
    pub max_body_bytes: usize,
    /// Percent-encode `/` when canonicalizing the path.
    pub encode_path_separators: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8334,
            credentials: Vec::new(),
            replay_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            resolver_timeout_ms: DEFAULT_RESOLVER_TIMEOUT.as_millis() as u64,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            encode_path_separators: false,
        }
    }
}

impl Config {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            canonicalizer: Canonicalizer::new(self.encode_path_separators),
            replay_window: ReplayWindow::new(Duration::from_secs(self.replay_tolerance_secs)),
            resolver_timeout: Duration::from_millis(self.resolver_timeout_ms),
            max_body_bytes: self.max_body_bytes,
        }
    }

    pub fn credentials(&self) -> Result<Vec<Credential>, CredentialError> {
        self.credentials
            .iter()
            .map(|c| Credential::new(c.access_key_id.clone(), c.secret_key.clone()))
            .collect()
    }
}

/// Builds the application router around an already configured pipeline.
pub fn router(pipeline: Arc<VerificationPipeline>) -> Router {
    let protected_routes = Router::new()
        .route("/", any(echo::handle))
        .route("/{*path}", any(echo::handle))
        // AuthLayer already caps the body at max_body_bytes.
        .layer(DefaultBodyLimit::disable())
        .layer(AuthLayer::new(pipeline));

    let public_routes = Router::new().route("/health", get(echo::health));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = StaticCredentialStore::from_credentials(config.credentials()?)?;
    if store.is_empty() {
        warn!("No credentials configured - every protected request will be rejected");
    } else {
        info!("Loaded {} credential(s)", store.len());
    }

    let pipeline = Arc::new(VerificationPipeline::new(
        Arc::new(store),
        config.pipeline_settings(),
    ));
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", &config.address, config.port)).await?;

    info!("running fnsign server on {}:{}", &config.address, config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
