use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque credential handed out and refreshed by the external store.
///
/// The core never inspects the token; it only watches `expires_at` to decide
/// when to ask the store for a refresh. Credential lifetime is orthogonal to
/// the hard session ceiling: a fresh credential never resets the 8-hour clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub fn new(token: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.to_string(),
            expires_at,
        }
    }

    /// Whether the credential expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now <= margin
    }
}

/// Session state machine.
///
/// `Anonymous -> Authenticating -> Authenticated -> (Refreshing) ->
/// Authenticated -> LoggedOut`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
    LoggedOut,
}

impl SessionState {
    /// Authenticated for access-gate purposes. `Refreshing` is a transient
    /// sub-state of an authenticated session, not a lapse.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Refreshing)
    }
}

/// Lifecycle events emitted on the session's broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    /// Forced teardown: hard ceiling breach or credential-refresh failure.
    SessionExpired,
}
