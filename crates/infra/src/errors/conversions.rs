//! Mapping of keychain, HTTP, JSON, I/O and URL errors onto `AuthError`.

use keyring::Error as KeyringError;
use realmkey_domain::AuthError;
use reqwest::Error as HttpError;

/// Carrier for `AuthError` so the foreign-error `From` impls can live in this
/// crate (orphan rule).
#[derive(Debug)]
pub struct InfraError(pub AuthError);

impl From<InfraError> for AuthError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<AuthError> for InfraError {
    fn from(value: AuthError) -> Self {
        InfraError(value)
    }
}

/// Per-library mapping, kept private behind the `From` impls.
trait IntoAuthError {
    fn into_auth(self) -> AuthError;
}

// keyring::Error → AuthError

impl IntoAuthError for KeyringError {
    fn into_auth(self) -> AuthError {
        use KeyringError::*;

        let description = self.to_string();

        match self {
            NoEntry => AuthError::Storage("keychain entry not found".into()),
            BadEncoding(_) => AuthError::Storage("credential in keychain is not valid UTF-8".into()),
            TooLong(name, limit) => AuthError::Storage(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Invalid(attr, reason) => {
                AuthError::Storage(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            PlatformFailure(err) => AuthError::Storage(format!("keychain platform error: {err}")),
            NoStorageAccess(err) => {
                AuthError::Storage(format!("unable to access secure storage: {err}"))
            }
            _ => AuthError::Storage(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_auth())
    }
}

// reqwest::Error → AuthError

impl IntoAuthError for HttpError {
    fn into_auth(self) -> AuthError {
        if self.is_timeout() {
            return AuthError::Network("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return AuthError::Network("HTTP connection failure".into());
        }

        if self.is_decode() {
            return AuthError::InvalidResponse(format!("failed to decode HTTP body: {self}"));
        }

        if let Some(status) = self.status() {
            return AuthError::Network(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            ));
        }

        AuthError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_auth())
    }
}

// serde_json / io / url → AuthError

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(AuthError::InvalidResponse(format!("invalid JSON: {value}")))
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(AuthError::Storage(format!("I/O failure: {value}")))
    }
}

impl From<url::ParseError> for InfraError {
    fn from(value: url::ParseError) -> Self {
        InfraError(AuthError::Config(format!("invalid URL: {value}")))
    }
}

/// Convert any supported infrastructure error straight into `AuthError`.
pub fn to_auth<E>(err: E) -> AuthError
where
    InfraError: From<E>,
{
    InfraError::from(err).into()
}
