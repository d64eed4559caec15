use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Invalid access key ID: {0}")]
    InvalidAccessKeyId(String),
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("Duplicate access key ID: {0}")]
    DuplicateAccessKeyId(String),
}

/// Infrastructure failure while looking up a credential.
///
/// An unknown access key is not an error; resolvers report it as `Ok(None)`.
#[derive(Error, Debug, Clone)]
pub enum ResolverError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
    #[error("credential store returned an invalid record: {0}")]
    InvalidRecord(#[from] CredentialError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_key_id: String,
    secret_key: String,
}

impl Credential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let access_key_id = access_key_id.into();
        let secret_key = secret_key.into();

        validate_access_key_id(&access_key_id)?;
        if secret_key.is_empty() {
            return Err(CredentialError::InvalidSecretKey(
                "Secret key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            access_key_id,
            secret_key,
        })
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Access key IDs travel inside the `Authorization` header, so they must be
/// visible ASCII and must not contain the field separator.
pub fn validate_access_key_id(access_key_id: &str) -> Result<(), CredentialError> {
    if access_key_id.is_empty() {
        return Err(CredentialError::InvalidAccessKeyId(
            "Access key ID cannot be empty".to_string(),
        ));
    }

    if !access_key_id
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b',')
    {
        return Err(CredentialError::InvalidAccessKeyId(format!(
            "Access key ID '{}' must be visible ASCII without commas",
            access_key_id.escape_debug()
        )));
    }

    Ok(())
}

/// Maps an access key ID to its credential.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Returns `Ok(None)` for unknown keys; `Err` only for infrastructure failures.
    async fn lookup(&self, access_key_id: &str) -> Result<Option<Credential>, ResolverError>;
}

/// In-memory credential set.
///
/// Lookups read an immutable snapshot, so a concurrent `rotate` is never
/// observed half-applied.
pub struct StaticCredentialStore {
    credentials: ArcSwap<HashMap<String, Credential>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self {
            credentials: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn from_credentials(
        credentials: impl IntoIterator<Item = Credential>,
    ) -> Result<Self, CredentialError> {
        let store = Self::new();
        store.rotate(credentials)?;
        Ok(store)
    }

    /// Adds or replaces a single credential (copy-on-write).
    pub fn add_credentials(&self, credential: Credential) {
        debug!(access_key_id = %credential.access_key_id(), "adding credential");
        self.credentials.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(credential.access_key_id().to_string(), credential.clone());
            next
        });
    }

    /// Atomically replaces the whole credential set.
    pub fn rotate(
        &self,
        credentials: impl IntoIterator<Item = Credential>,
    ) -> Result<(), CredentialError> {
        let mut next = HashMap::new();
        for credential in credentials {
            let key = credential.access_key_id().to_string();
            if next.contains_key(&key) {
                return Err(CredentialError::DuplicateAccessKeyId(key));
            }
            next.insert(key, credential);
        }

        info!(count = next.len(), "credential set replaced");
        self.credentials.store(Arc::new(next));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.credentials.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.load().is_empty()
    }
}

impl Default for StaticCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialStore {
    async fn lookup(&self, access_key_id: &str) -> Result<Option<Credential>, ResolverError> {
        Ok(self.credentials.load().get(access_key_id).cloned())
    }
}
