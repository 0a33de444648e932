//! Resolution Engine.
//!
//! Computes one user's effective permission set from the catalog, the role
//! defaults for the user's role, and the user's own overrides. Pure given a
//! consistent read of the three tables; resolution never mutates its inputs,
//! so concurrent admin edits only affect which snapshot a given run sees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResolverConfig;
use crate::models::{PermissionKey, ResolvedPermissions, UserId, UserProfile};
use crate::store::AccessStore;
use crate::{Error, Result};

/// Stateless permission resolver over an injected store.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn AccessStore>,
    read_timeout: Duration,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl PermissionResolver {
    #[must_use]
    pub fn new(store: Arc<dyn AccessStore>, config: &ResolverConfig) -> Self {
        Self {
            store,
            read_timeout: config.read_timeout(),
        }
    }

    /// Bounded store read. A timeout counts as a failed read: the whole
    /// resolution fails closed rather than serving partial data.
    async fn read<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.read_timeout, fut)
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Resolve the effective permission set for one user.
    ///
    /// Precedence, highest first:
    /// 1. inactive profile: empty set, unconditionally
    /// 2. admin role: every active catalog key (overrides cannot lock out an
    ///    admin)
    /// 3. user override rows, in both directions
    /// 4. role defaults; an absent row means "not granted"
    ///
    /// Any failed or timed-out read propagates as a recoverable error; the
    /// caller must treat it as an empty set (fail closed), never as stale or
    /// partial data.
    pub async fn resolve(&self, user_id: &UserId) -> Result<ResolvedPermissions> {
        let profile = self.read(self.store.profile(user_id)).await?;
        self.resolve_with_profile(&profile).await
    }

    /// Resolve against an already-fetched profile. Used by callers that just
    /// received a profile change event and must not race a second fetch.
    pub async fn resolve_with_profile(
        &self,
        profile: &UserProfile,
    ) -> Result<ResolvedPermissions> {
        if !profile.is_active {
            tracing::debug!(user_id = %profile.id, "inactive profile, resolving to empty set");
            return Ok(ResolvedPermissions::empty());
        }

        let catalog = self.read(self.store.permission_catalog()).await?;

        // Active catalog keys indexed by id; rows pointing at inactive or
        // unknown permissions are skipped below.
        let active: HashMap<_, &PermissionKey> = catalog
            .iter()
            .filter(|p| p.active)
            .map(|p| (p.id.clone(), &p.key))
            .collect();

        if profile.role.is_admin() {
            let resolved: ResolvedPermissions =
                active.values().map(|&key| key.clone()).collect();
            tracing::debug!(
                user_id = %profile.id,
                granted = resolved.len(),
                "admin fast-path resolution"
            );
            return Ok(resolved);
        }

        let mut base: HashMap<&PermissionKey, bool> =
            active.values().map(|&key| (key, false)).collect();

        let defaults = self.read(self.store.role_defaults(profile.role)).await?;
        for row in &defaults {
            if let Some(&key) = active.get(&row.permission_id) {
                base.insert(key, row.granted);
            }
        }

        let overrides = self.read(self.store.user_overrides(&profile.id)).await?;
        for row in &overrides {
            // Override always wins over the role default, in both directions.
            if let Some(&key) = active.get(&row.permission_id) {
                base.insert(key, row.granted);
            }
        }

        let resolved: ResolvedPermissions = base
            .into_iter()
            .filter_map(|(key, granted)| granted.then(|| key.clone()))
            .collect();

        tracing::debug!(
            user_id = %profile.id,
            role = %profile.role,
            granted = resolved.len(),
            defaults = defaults.len(),
            overrides = overrides.len(),
            "resolved permission set"
        );

        Ok(resolved)
    }
}
