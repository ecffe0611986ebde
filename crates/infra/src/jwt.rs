//! JWT payload decoding
//!
//! Reads claims without verifying the signature. The session manager only
//! uses them to decide when a stored refresh token is worth presenting; the
//! identity provider remains the authority on validity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use realmkey_core::TokenDecoder;
use realmkey_domain::{AuthError, DecodedToken, Result};
use serde_json::{Map, Value};

/// `TokenDecoder` for compact-serialized JWTs.
#[derive(Debug, Default, Clone, Copy)]
pub struct JwtTokenDecoder;

impl TokenDecoder for JwtTokenDecoder {
    fn decode(&self, jwt: &str) -> Result<DecodedToken> {
        let claims = decode_claims(jwt)?;
        let expires_at = match claims.get("exp") {
            None | Some(Value::Null) => None,
            Some(exp) => Some(parse_exp(exp)?),
        };

        Ok(DecodedToken { expires_at, claims })
    }
}

/// Decode the payload segment of a JWT into its claim map.
///
/// # Errors
/// `AuthError::Decode` when the token is not three dot-separated segments,
/// the payload is not base64url, or it is not a JSON object.
pub fn decode_claims(jwt: &str) -> Result<Map<String, Value>> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::Decode("invalid JWT format".into()));
    }

    // Some issuers keep the padding
    let payload = parts[1].trim_end_matches('=');
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| AuthError::Decode(format!("failed to decode JWT payload: {err}")))?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|err| AuthError::Decode(format!("failed to parse JWT payload: {err}")))
}

fn parse_exp(exp: &Value) -> Result<DateTime<Utc>> {
    let seconds = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|value| value as i64))
        .ok_or_else(|| AuthError::Decode("exp claim is not numeric".into()))?;

    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AuthError::Decode(format!("exp claim out of range: {seconds}")))
}
