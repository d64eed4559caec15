use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use super::credentials::validate_access_key_id;
use super::signer::SIGNING_SCHEME;

const ACCESS_KEY_ID_FIELD: &str = "AccessKeyId=";
const SIGNATURE_FIELD: &str = "Signature=";
const SIGNATURE_HEX_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderParseError {
    #[error("missing or misspelled scheme prefix")]
    InvalidScheme,
    #[error("expected exactly two fields, got {0}")]
    FieldCount(usize),
    #[error("unexpected field, expected {0}")]
    UnexpectedField(&'static str),
    #[error("access key ID is empty or invalid")]
    InvalidAccessKeyId,
    #[error("signature must be 64 lowercase hex characters")]
    InvalidSignature,
}

/// Parsed `Authorization: FNSIGN AccessKeyId=<id>,Signature=<hex>` value.
///
/// The accepted grammar is exact: the scheme token, one space, then the two
/// fields in that order separated by a single comma. No surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeaderValue {
    pub scheme: String,
    pub access_key_id: String,
    pub signature: String,
}

impl AuthorizationHeaderValue {
    pub fn new(access_key_id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            scheme: SIGNING_SCHEME.to_string(),
            access_key_id: access_key_id.into(),
            signature: signature.into(),
        }
    }
}

impl FromStr for AuthorizationHeaderValue {
    type Err = HeaderParseError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let fields = header
            .strip_prefix(SIGNING_SCHEME)
            .and_then(|rest| rest.strip_prefix(' '))
            .ok_or(HeaderParseError::InvalidScheme)?;

        let parts: Vec<&str> = fields.split(',').collect();
        if parts.len() != 2 {
            debug!("authorization header has {} fields", parts.len());
            return Err(HeaderParseError::FieldCount(parts.len()));
        }

        let access_key_id = parts[0]
            .strip_prefix(ACCESS_KEY_ID_FIELD)
            .ok_or(HeaderParseError::UnexpectedField("AccessKeyId"))?;
        let signature = parts[1]
            .strip_prefix(SIGNATURE_FIELD)
            .ok_or(HeaderParseError::UnexpectedField("Signature"))?;

        validate_access_key_id(access_key_id).map_err(|_| HeaderParseError::InvalidAccessKeyId)?;

        if signature.len() != SIGNATURE_HEX_LEN
            || !signature
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(HeaderParseError::InvalidSignature);
        }

        Ok(Self::new(access_key_id, signature))
    }
}

impl fmt::Display for AuthorizationHeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{},{}{}",
            self.scheme, ACCESS_KEY_ID_FIELD, self.access_key_id, SIGNATURE_FIELD, self.signature
        )
    }
}
