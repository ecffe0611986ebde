//! OIDC authorization-code flow adapters
//!
//! - [`discovery`]: cached `.well-known/openid-configuration` lookup
//! - [`callback`]: loopback HTTP server receiving browser redirects
//! - [`browser`]: system browser launcher
//! - [`agent`]: the `AuthorizationAgent` tying them together

pub mod agent;
pub mod browser;
pub mod callback;
pub mod discovery;

pub use agent::OidcAuthorizationAgent;
pub use browser::{BrowserLauncher, SystemBrowser};
pub use callback::{CallbackParams, LoopbackCallbackServer};
pub use discovery::{DiscoveryClient, ProviderMetadata};
