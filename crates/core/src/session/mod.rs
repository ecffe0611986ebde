//! OIDC session lifecycle

pub mod error_sink;
pub mod manager;
pub mod ports;
pub mod state_channel;

pub use error_sink::{ErrorSink, TracingErrorSink};
pub use manager::{SessionCollaborators, SessionManager};
pub use ports::*;
pub use state_channel::{AuthStateChannel, AuthStateStream};
