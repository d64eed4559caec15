//! Canonical request construction.
//!
//! The canonical request is the newline-joined string
//!
//! ```text
//! METHOD\n
//! CanonicalPath\n
//! CanonicalQuery\n
//! BodyDigest
//! ```
//!
//! with no trailing newline. Both the signer and the verifier must produce the
//! exact same bytes here, so every component is normalized before joining.

use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// SHA-256 of the empty string, used for absent or empty bodies.
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

// Everything outside the unreserved set {A-Z a-z 0-9 - . _ ~} is escaped.
const UNRESERVED_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

// Same as above but keeps the path separator literal.
const PATH_ENCODE_SET: &AsciiSet = &UNRESERVED_ENCODE_SET.remove(b'/');

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Canonicalizer {
    /// Percent-encode `/` in the path instead of keeping it as a separator.
    pub encode_separators: bool,
}

impl Canonicalizer {
    pub fn new(encode_separators: bool) -> Self {
        Self { encode_separators }
    }

    /// Builds the canonical request string for an already digested body.
    pub fn build(&self, method: &str, path: &str, query: &str, body_digest: &str) -> String {
        assemble(
            method,
            &canonical_path(path, self.encode_separators),
            &canonical_query(query),
            body_digest,
        )
    }
}

/// Joins already canonicalized components.
pub fn assemble(
    method: &str,
    canonical_path: &str,
    canonical_query: &str,
    body_digest: &str,
) -> String {
    format!("{method}\n{canonical_path}\n{canonical_query}\n{body_digest}")
}

/// Percent-decodes `path` and re-encodes it with the unreserved set.
///
/// An empty path canonicalizes to `/`. Hex digits in escapes are uppercase.
pub fn canonical_path(path: &str, encode_separators: bool) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let decoded: Vec<u8> = percent_decode_str(path).collect();
    let set = if encode_separators {
        UNRESERVED_ENCODE_SET
    } else {
        PATH_ENCODE_SET
    };

    percent_encode(&decoded, set).to_string()
}

/// Decodes a raw query string and re-assembles it sorted by key.
///
/// The sort is stable, so repeated keys keep the order they were sent in.
/// A parameter without `=` is emitted as `key=`.
pub fn canonical_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex-encoded SHA-256 of the body, or the empty-string sentinel.
pub fn body_digest(body: &[u8]) -> String {
    if body.is_empty() {
        return EMPTY_BODY_SHA256.to_string();
    }

    hex::encode(Sha256::digest(body))
}

fn encode_component(s: &str) -> String {
    percent_encode(s.as_bytes(), UNRESERVED_ENCODE_SET).to_string()
}
