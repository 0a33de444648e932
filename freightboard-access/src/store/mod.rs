//! Data-access seam to the external store.
//!
//! The core never owns persistence. Everything it reads (catalog, role
//! defaults, overrides, profiles) and every push notification it consumes
//! arrives through the [`AccessStore`] trait, so sessions and tests can run
//! against independent store instances.

pub mod memory;
pub mod slot;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::{
    ChangeEvent, ChangeScope, Credential, Permission, Role, RoleDefault, UserId, UserOverride,
    UserProfile,
};
use crate::{Error, Result};

pub use memory::MemoryStore;
pub use slot::{MemorySlot, SessionSlot};

/// A scoped change-notification subscription.
///
/// Wraps a broadcast receiver and filters it down to one [`ChangeScope`].
/// Dropping the feed unsubscribes. Lagged receivers skip the dropped events
/// and keep going: the feed is at-most-effectively-once by contract, and the
/// focus-regain / reconciliation fallbacks cover the gap.
pub struct ChangeFeed {
    scope: ChangeScope,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    #[must_use]
    pub fn new(scope: ChangeScope, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { scope, rx }
    }

    #[must_use]
    pub const fn scope(&self) -> &ChangeScope {
        &self.scope
    }

    /// Receive the next event matching this feed's scope.
    ///
    /// Returns `Err(Error::FeedClosed)` when the store side hangs up.
    pub async fn recv(&mut self) -> Result<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.matches(&self.scope) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        missed,
                        scope = ?self.scope,
                        "change feed lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::FeedClosed),
            }
        }
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("scope", &self.scope)
            .finish()
    }
}

/// External data-access collaborator.
///
/// All reads must be batched (one call per table slice) and side-effect free;
/// the core calls them concurrently from multiple sessions without locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Full permission catalog, active and inactive rows alike.
    async fn permission_catalog(&self) -> Result<Vec<Permission>>;

    /// Role-default rows for one role.
    async fn role_defaults(&self, role: Role) -> Result<Vec<RoleDefault>>;

    /// Override rows for one user.
    async fn user_overrides(&self, user_id: &UserId) -> Result<Vec<UserOverride>>;

    /// One user's profile row.
    async fn profile(&self, user_id: &UserId) -> Result<UserProfile>;

    /// Subscribe to mutation notifications for one scope.
    async fn subscribe(&self, scope: ChangeScope) -> Result<ChangeFeed>;

    /// Refresh the session credential. A failure here is terminal for the
    /// session.
    async fn refresh_credential(&self) -> Result<Credential>;

    /// Server-side sign-out. Best effort; callers must tear local state down
    /// before invoking this.
    async fn sign_out(&self) -> Result<()>;
}
