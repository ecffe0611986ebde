//! Pluggable error reporting
//!
//! Session operations that fold failures into their return value still hand
//! the failure to an [`ErrorSink`], so applications can route them to their
//! own diagnostics or UI.

use std::backtrace::Backtrace;

use realmkey_domain::AuthError;
use tracing::error;

/// Receiver of errors caught inside session operations.
///
/// Implementations must not panic.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str, error: &AuthError, backtrace: &Backtrace);
}

/// Default sink: logs through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, message: &str, error: &AuthError, backtrace: &Backtrace) {
        error!(error = %error, backtrace = %backtrace, "{message}");
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &AuthError, &Backtrace) + Send + Sync,
{
    fn report(&self, message: &str, error: &AuthError, backtrace: &Backtrace) {
        self(message, error, backtrace);
    }
}
