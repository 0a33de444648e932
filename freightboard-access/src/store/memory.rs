//! In-memory reference implementation of [`AccessStore`].
//!
//! Backs the integration tests and lets embedders run without a real backend.
//! Mutation helpers emit the matching change events on a broadcast channel so
//! multi-session convergence behaves like the production feed. Fault-injection
//! toggles simulate read failures, refresh failures and dropped events.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;

use async_trait::async_trait;

use super::{AccessStore, ChangeFeed};
use crate::models::{
    ChangeEvent, ChangeOp, ChangeScope, Credential, Permission, PermissionId, Role, RoleDefault,
    UserId, UserOverride, UserProfile,
};
use crate::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory store with a broadcast-based change feed.
pub struct MemoryStore {
    catalog: DashMap<PermissionId, Permission>,
    role_defaults: DashMap<(Role, PermissionId), bool>,
    overrides: DashMap<(UserId, PermissionId), UserOverride>,
    profiles: DashMap<UserId, UserProfile>,

    events: broadcast::Sender<ChangeEvent>,
    credential: Mutex<Credential>,
    credential_ttl: Mutex<Duration>,
    refresh_count: AtomicU64,

    // Fault injection for tests
    fail_reads: AtomicBool,
    fail_refresh: AtomicBool,
    fail_sign_out: AtomicBool,
    emit_events: AtomicBool,
    sign_out_calls: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            catalog: DashMap::new(),
            role_defaults: DashMap::new(),
            overrides: DashMap::new(),
            profiles: DashMap::new(),
            events,
            credential: Mutex::new(Credential::new("credential-0", Utc::now() + Duration::hours(1))),
            credential_ttl: Mutex::new(Duration::hours(1)),
            refresh_count: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            emit_events: AtomicBool::new(true),
            sign_out_calls: AtomicU64::new(0),
        }
    }

    fn emit(&self, event: ChangeEvent) {
        if self.emit_events.load(Ordering::Relaxed) {
            // No receivers is fine; nobody is listening yet.
            let _ = self.events.send(event);
        }
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::Store("injected read failure".to_string()));
        }
        Ok(())
    }

    // ----- Seeding & admin-surface mutations -----

    pub fn seed_catalog(&self, permissions: Vec<Permission>) {
        for permission in permissions {
            self.catalog.insert(permission.id.clone(), permission);
        }
    }

    /// Look up a catalog entry id by key. Test convenience.
    #[must_use]
    pub fn permission_id_for_key(&self, key: &str) -> Option<PermissionId> {
        self.catalog
            .iter()
            .find(|entry| entry.key.as_str() == key)
            .map(|entry| entry.id.clone())
    }

    pub fn set_permission_active(&self, permission_id: &PermissionId, active: bool) {
        if let Some(mut entry) = self.catalog.get_mut(permission_id) {
            entry.active = active;
        }
    }

    pub fn upsert_role_default(&self, role: Role, permission_id: PermissionId, granted: bool) {
        let op = if self
            .role_defaults
            .insert((role, permission_id.clone()), granted)
            .is_some()
        {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        self.emit(ChangeEvent {
            scope: ChangeScope::RoleDefaults { role },
            op,
            permission_id: Some(permission_id),
        });
    }

    pub fn remove_role_default(&self, role: Role, permission_id: &PermissionId) {
        if self
            .role_defaults
            .remove(&(role, permission_id.clone()))
            .is_some()
        {
            self.emit(ChangeEvent {
                scope: ChangeScope::RoleDefaults { role },
                op: ChangeOp::Delete,
                permission_id: Some(permission_id.clone()),
            });
        }
    }

    pub fn upsert_override(&self, row: UserOverride) {
        let user_id = row.user_id.clone();
        let permission_id = row.permission_id.clone();
        let op = if self
            .overrides
            .insert((user_id.clone(), permission_id.clone()), row)
            .is_some()
        {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        self.emit(ChangeEvent {
            scope: ChangeScope::UserOverrides { user_id },
            op,
            permission_id: Some(permission_id),
        });
    }

    /// Remove an override, unpinning the user back to the role default.
    pub fn remove_override(&self, user_id: &UserId, permission_id: &PermissionId) {
        if self
            .overrides
            .remove(&(user_id.clone(), permission_id.clone()))
            .is_some()
        {
            self.emit(ChangeEvent {
                scope: ChangeScope::UserOverrides {
                    user_id: user_id.clone(),
                },
                op: ChangeOp::Delete,
                permission_id: Some(permission_id.clone()),
            });
        }
    }

    pub fn put_profile(&self, profile: UserProfile) {
        let user_id = profile.id.clone();
        let op = if self.profiles.insert(user_id.clone(), profile).is_some() {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        self.emit(ChangeEvent {
            scope: ChangeScope::Profile { user_id },
            op,
            permission_id: None,
        });
    }

    // ----- Credential control -----

    pub fn set_credential(&self, credential: Credential) {
        *self.credential.lock() = credential;
    }

    pub fn set_credential_ttl(&self, ttl: Duration) {
        *self.credential_ttl.lock() = ttl;
    }

    #[must_use]
    pub fn current_credential(&self) -> Credential {
        self.credential.lock().clone()
    }

    // ----- Fault injection -----

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::Relaxed);
    }

    /// Suppress change events, simulating a feed that drops notifications.
    pub fn set_emit_events(&self, emit: bool) {
        self.emit_events.store(emit, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sign_out_calls(&self) -> u64 {
        self.sign_out_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn permission_catalog(&self) -> Result<Vec<Permission>> {
        self.check_reads()?;
        Ok(self
            .catalog
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn role_defaults(&self, role: Role) -> Result<Vec<RoleDefault>> {
        self.check_reads()?;
        Ok(self
            .role_defaults
            .iter()
            .filter(|entry| entry.key().0 == role)
            .map(|entry| RoleDefault {
                role,
                permission_id: entry.key().1.clone(),
                granted: *entry.value(),
            })
            .collect())
    }

    async fn user_overrides(&self, user_id: &UserId) -> Result<Vec<UserOverride>> {
        self.check_reads()?;
        Ok(self
            .overrides
            .iter()
            .filter(|entry| entry.key().0 == *user_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn profile(&self, user_id: &UserId) -> Result<UserProfile> {
        self.check_reads()?;
        self.profiles
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("profile {user_id}")))
    }

    async fn subscribe(&self, scope: ChangeScope) -> Result<ChangeFeed> {
        Ok(ChangeFeed::new(scope, self.events.subscribe()))
    }

    async fn refresh_credential(&self) -> Result<Credential> {
        if self.fail_refresh.load(Ordering::Relaxed) {
            return Err(Error::CredentialRefresh(
                "injected refresh failure".to_string(),
            ));
        }
        let n = self.refresh_count.fetch_add(1, Ordering::Relaxed) + 1;
        let ttl = *self.credential_ttl.lock();
        let refreshed = Credential::new(&format!("credential-{n}"), Utc::now() + ttl);
        *self.credential.lock() = refreshed.clone();
        Ok(refreshed)
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_sign_out.load(Ordering::Relaxed) {
            return Err(Error::Store("injected sign-out failure".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("catalog_len", &self.catalog.len())
            .field("role_defaults_len", &self.role_defaults.len())
            .field("overrides_len", &self.overrides.len())
            .field("profiles_len", &self.profiles.len())
            .finish()
    }
}
