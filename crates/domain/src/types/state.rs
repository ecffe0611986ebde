//! Authentication state exposed to observers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Single source of truth for "is the user logged in".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No usable session
    #[default]
    Unauthenticated,
    /// An init, login, refresh or logout operation is in flight
    Pending,
    Authenticated,
    /// Network absent; validity of the previous session is unknown
    Unavailable,
}

impl AuthState {
    /// Terminal states end an operation; `Pending` never does.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Pending => "pending",
            Self::Authenticated => "authenticated",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}
