use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::canonical::{assemble, canonical_path, canonical_query, Canonicalizer};
use super::credentials::Credential;

type HmacSha256 = Hmac<Sha256>;

/// Scheme token, also prefixed onto the raw secret for the first key round.
pub const SIGNING_SCHEME: &str = "FNSIGN";
pub const SIGNING_ALGORITHM: &str = "HMAC-SHA256";
pub const REQUEST_SCOPE: &str = "feiniubus_request";

/// `HMAC-SHA256-<timestamp>\n<access key id>\n<hex sha256 of canonical request>`
pub fn string_to_sign(timestamp: &str, access_key_id: &str, canonical_request: &str) -> String {
    let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));

    format!("{SIGNING_ALGORITHM}-{timestamp}\n{access_key_id}\n{hashed_canonical_request}")
}

/// Expands a secret into the key scoped to this scheme, timestamp and request scope.
///
/// The raw secret only ever meets the timestamp; later rounds consume derived keys.
pub fn derive_signing_key(secret: &str, timestamp: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("{SIGNING_SCHEME}{secret}").as_bytes(),
        timestamp.as_bytes(),
    );
    hmac_sha256(&k_date, REQUEST_SCOPE.as_bytes())
}

/// Lowercase hex signature of a canonical request.
pub fn sign(secret: &str, timestamp: &str, access_key_id: &str, canonical_request: &str) -> String {
    let string_to_sign = string_to_sign(timestamp, access_key_id, canonical_request);
    let signing_key = derive_signing_key(secret, timestamp);

    hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Computes request signatures.
///
/// The verification pipeline only talks to this trait, which keeps the
/// cryptographic step replaceable in tests.
pub trait SignatureComputer: Send + Sync {
    fn compute(
        &self,
        secret: &str,
        timestamp: &str,
        access_key_id: &str,
        canonical_request: &str,
    ) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Signer;

impl SignatureComputer for HmacSha256Signer {
    fn compute(
        &self,
        secret: &str,
        timestamp: &str,
        access_key_id: &str,
        canonical_request: &str,
    ) -> String {
        sign(secret, timestamp, access_key_id, canonical_request)
    }
}

/// Everything derived while signing one request.
///
/// Each field is a pure function of the ones before it and none change after
/// `build` returns, so rebuilding from the same inputs yields the same signature.
pub struct SigningContext {
    method: String,
    canonical_path: String,
    canonical_query: String,
    body_digest: String,
    timestamp: String,
    credential: Credential,
    canonical_request: String,
    string_to_sign: String,
    signature: String,
}

impl SigningContext {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        canonicalizer: &Canonicalizer,
        signer: &dyn SignatureComputer,
        method: &str,
        path: &str,
        query: &str,
        body_digest: &str,
        timestamp: &str,
        credential: Credential,
    ) -> Self {
        let canonical_path = canonical_path(path, canonicalizer.encode_separators);
        let canonical_query = canonical_query(query);
        let canonical_request =
            assemble(method, &canonical_path, &canonical_query, body_digest);
        let string_to_sign =
            string_to_sign(timestamp, credential.access_key_id(), &canonical_request);
        let signature = signer.compute(
            credential.secret_key(),
            timestamp,
            credential.access_key_id(),
            &canonical_request,
        );

        Self {
            method: method.to_string(),
            canonical_path,
            canonical_query,
            body_digest: body_digest.to_string(),
            timestamp: timestamp.to_string(),
            credential,
            canonical_request,
            string_to_sign,
            signature,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    pub fn canonical_query(&self) -> &str {
        &self.canonical_query
    }

    pub fn body_digest(&self) -> &str {
        &self.body_digest
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn access_key_id(&self) -> &str {
        self.credential.access_key_id()
    }

    pub fn canonical_request(&self) -> &str {
        &self.canonical_request
    }

    pub fn string_to_sign(&self) -> &str {
        &self.string_to_sign
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("method", &self.method)
            .field("canonical_path", &self.canonical_path)
            .field("canonical_query", &self.canonical_query)
            .field("body_digest", &self.body_digest)
            .field("timestamp", &self.timestamp)
            .field("access_key_id", &self.credential.access_key_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnsign::canonical::EMPTY_BODY_SHA256;

    const TIMESTAMP: &str = "20240101T120000Z";

    fn canonical() -> String {
        format!("GET\n/orders\nstatus=open\n{EMPTY_BODY_SHA256}")
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = string_to_sign(TIMESTAMP, "AKID1", &canonical());
        assert_eq!(
            sts,
            "HMAC-SHA256-20240101T120000Z\nAKID1\n4cbbd921d668564edf351503b4a9b9f785a5722a60e24ac75dd801a8dc5f2510"
        );
    }

    #[test]
    fn test_known_signature() {
        let signature = sign("s3cr3t", TIMESTAMP, "AKID1", &canonical());
        assert_eq!(
            signature,
            "d06b69c23e562375d6f6fa4f0c844de5a7df1776bf32eb574cf4ffe50d3f02fd"
        );
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let signature = sign("s3cr3t", TIMESTAMP, "AKID1", &canonical());
        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_signing_key_depends_on_timestamp() {
        assert_ne!(
            derive_signing_key("s3cr3t", "20240101T120000Z"),
            derive_signing_key("s3cr3t", "20240101T120001Z"),
        );
    }

    #[test]
    fn test_context_is_deterministic() {
        let credential = Credential::new("AKID1", "s3cr3t").unwrap();
        let build = || {
            SigningContext::build(
                &Canonicalizer::default(),
                &HmacSha256Signer,
                "GET",
                "/orders",
                "status=open",
                EMPTY_BODY_SHA256,
                TIMESTAMP,
                credential.clone(),
            )
        };

        let first = build();
        let second = build();
        assert_eq!(first.signature(), second.signature());
        assert_eq!(first.canonical_request(), canonical());
        assert_eq!(first.canonical_query(), "status=open");
    }

    #[test]
    fn test_context_debug_hides_secret() {
        let credential = Credential::new("AKID1", "s3cr3t").unwrap();
        let context = SigningContext::build(
            &Canonicalizer::default(),
            &HmacSha256Signer,
            "GET",
            "/orders",
            "",
            EMPTY_BODY_SHA256,
            TIMESTAMP,
            credential,
        );

        let debug = format!("{:?}", context);
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("AKID1"));
    }
}
