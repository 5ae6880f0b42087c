//! Reading the expiry claim embedded in a bearer token.
//!
//! Tokens are JWTs. Only the payload segment is decoded; the signature is
//! the API's business, not ours. Anything that does not yield a usable `exp`
//! is an error, and callers treat every error as "expired".

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not valid base64url")]
    Encoding,

    #[error("token payload is not valid JSON: {0}")]
    Payload(String),

    #[error("token has no usable exp claim")]
    MissingExpiry,
}

/// The registered claims we look at.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the epoch
    pub exp: Option<i64>,
    /// Issued-at, seconds since the epoch
    pub iat: Option<i64>,
    pub sub: Option<String>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Result<DateTime<Utc>, ClaimsError> {
        self.exp
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(ClaimsError::MissingExpiry)
    }
}

pub fn decode_claims(token: &str) -> Result<TokenClaims, ClaimsError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(ClaimsError::Malformed);
    };

    // Some issuers keep base64 padding on the payload.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| ClaimsError::Encoding)?;

    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Payload(e.to_string()))
}

/// Expiry of `token` taken from its `exp` claim
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, ClaimsError> {
    decode_claims(token)?.expires_at()
}
