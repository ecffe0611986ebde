//! Domain types for the session client

pub mod requests;
pub mod state;
pub mod token;

pub use requests::{AuthorizationRequest, EndSessionRequest, ProviderLocation, TokenRequest};
pub use state::AuthState;
pub use token::{DecodedToken, TokenResult, TokenSet};
