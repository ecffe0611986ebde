//! OAuth token types
//!
//! `TokenResult` is whatever an authorization agent produced; `TokenSet` is
//! the validated subset the session manager keeps in memory.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw outcome of a code exchange or refresh-token grant.
///
/// Every field is optional because identity providers are free to omit any
/// of them; use [`TokenResult::into_token_set`] to keep only usable results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute access-token expiry (UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,

    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResult {
    /// A result is structurally valid when it carries an access token, an id
    /// token and an access-token expiry.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.id_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.access_token_expires_at.is_some()
    }

    /// Convert into a `TokenSet`, or `None` when the result is unusable.
    #[must_use]
    pub fn into_token_set(self) -> Option<TokenSet> {
        if !self.is_structurally_valid() {
            return None;
        }

        match (self.access_token, self.id_token, self.access_token_expires_at) {
            (Some(access_token), Some(id_token), Some(expires_at)) => Some(TokenSet {
                access_token,
                id_token,
                refresh_token: self.refresh_token,
                access_token_expires_at: expires_at,
            }),
            _ => None,
        }
    }
}

/// Tokens of the current session.
///
/// Replaced wholesale on every successful exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub access_token_expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Valid iff the access token is present and not expired right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && Utc::now() < self.access_token_expires_at
    }

    /// Whether the access token expires within `threshold` from now.
    #[must_use]
    pub fn expires_within(&self, threshold: Duration) -> bool {
        Utc::now() + threshold >= self.access_token_expires_at
    }

    /// Seconds until the access token expires (negative once expired).
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.access_token_expires_at - Utc::now()).num_seconds()
    }
}

/// Claims extracted from a JWT by a token decoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedToken {
    /// `exp` claim, when present
    pub expires_at: Option<DateTime<Utc>>,
    pub claims: Map<String, Value>,
}

impl DecodedToken {
    /// Whether the token will have expired `lookahead` from now.
    ///
    /// Tokens without an `exp` claim (e.g. offline tokens) never expire.
    #[must_use]
    pub fn will_expire(&self, lookahead: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + lookahead >= expires_at,
            None => false,
        }
    }

    /// String claim lookup
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}
