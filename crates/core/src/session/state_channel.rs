//! Broadcast channel for authentication state
//!
//! Every subscriber first receives the state current at subscription time,
//! then each later transition in emission order. Emission never blocks; a
//! subscriber that falls more than `capacity` transitions behind skips the
//! lost ones and keeps going.

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use realmkey_domain::AuthState;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

const DEFAULT_CAPACITY: usize = 64;

/// Stream of authentication states handed to observers
pub type AuthStateStream = BoxStream<'static, AuthState>;

/// Current-value broadcast of [`AuthState`].
pub struct AuthStateChannel {
    current: Mutex<AuthState>,
    sender: broadcast::Sender<AuthState>,
}

impl AuthStateChannel {
    /// Create a channel whose first value is `Unauthenticated`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { current: Mutex::new(AuthState::default()), sender }
    }

    /// State most recently emitted (or the initial value).
    #[must_use]
    pub fn current(&self) -> AuthState {
        *self.current.lock()
    }

    /// Publish a transition to all subscribers.
    pub fn emit(&self, state: AuthState) {
        let mut current = self.current.lock();
        let previous = std::mem::replace(&mut *current, state);
        // No receivers is fine: late subscribers replay `current`.
        let _ = self.sender.send(state);
        info!(from = %previous, to = %state, "Authentication state changed");
    }

    /// Subscribe to the state stream.
    ///
    /// The receiver is registered under the same lock that `emit` takes, so
    /// no transition is lost or duplicated between the replayed value and
    /// the live ones.
    #[must_use]
    pub fn subscribe(&self) -> AuthStateStream {
        let current = self.current.lock();
        let receiver = self.sender.subscribe();
        let initial = *current;
        drop(current);

        let live = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(state) => Some(state),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth state subscriber lagged; skipping transitions");
                    None
                }
            }
        });

        stream::once(async move { initial }).chain(live).boxed()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthStateChannel {
    fn default() -> Self {
        Self::new()
    }
}
