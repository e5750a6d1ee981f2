//! Access-token claim decoding.
//!
//! Only the payload segment is read; the signature is never checked. The
//! expiry is a countdown against a value the server issued, nothing more.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not base64url: {0}")]
    Encoding(String),
    #[error("token payload is not JSON: {0}")]
    Payload(String),
    #[error("token has no usable exp claim")]
    MissingExpiry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
}

pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .map_err(|e| TokenError::Encoding(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Payload(e.to_string()))
}

/// Expiry instant carried by the token's `exp` claim.
pub fn expires_at(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let exp = decode_claims(token)?.exp.ok_or(TokenError::MissingExpiry)?;
    DateTime::from_timestamp(exp, 0).ok_or(TokenError::MissingExpiry)
}

#[cfg(test)]
pub(crate) fn make_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{}}}"#, exp));
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_exp() {
        let token = make_token(1_790_000_000);
        assert_eq!(expires_at(&token).unwrap().timestamp(), 1_790_000_000);
        assert_eq!(decode_claims(&token).unwrap().sub.as_deref(), Some("1"));
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(expires_at("abc"), Err(TokenError::Malformed));
        assert_eq!(expires_at("a.b.c.d"), Err(TokenError::Malformed));
        assert!(matches!(expires_at("a.!!!.c"), Err(TokenError::Encoding(_))));
        let no_exp = format!("x.{}.y", URL_SAFE_NO_PAD.encode(br#"{"sub":"1"}"#));
        assert_eq!(expires_at(&no_exp), Err(TokenError::MissingExpiry));
    }
}
