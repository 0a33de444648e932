//! Session Lifecycle Manager.
//!
//! One `SessionManager` per client session. It records the login timestamp,
//! populates the permission cache, keeps it fresh through the change feed and
//! fallback triggers, runs the hard-expiry / credential-refresh / heartbeat
//! tickers, and tears everything down on logout or forced expiry.
//!
//! Teardown is synchronous from the caller's point of view: local state is
//! cleared before the best-effort server sign-out call runs, so a failing
//! cleanup call can never leave the session looking authenticated.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::access_gate::AccessGate;
use super::change_feed::{self, RefreshReason};
use super::resolver::PermissionResolver;
use super::session_cache::SessionPermissionCache;
use crate::config::Config;
use crate::models::{
    Credential, ResolvedPermissions, Role, SessionEvent, SessionState, UserId,
};
use crate::store::{AccessStore, MemorySlot, SessionSlot};
use crate::{Error, Result};

/// Slot key for the persisted login timestamp (RFC 3339).
pub const LOGIN_TIMESTAMP_KEY: &str = "login_timestamp";

const EVENT_CHANNEL_CAPACITY: usize = 16;
const REFRESH_CHANNEL_CAPACITY: usize = 16;

/// Wall-clock source. Injected so expiry and liveness checks are testable;
/// production uses [`SystemClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AuthedUser {
    pub user_id: UserId,
    pub role: Role,
}

pub(crate) struct SessionInner {
    pub(crate) store: Arc<dyn AccessStore>,
    slot: Arc<dyn SessionSlot>,
    clock: Arc<dyn Clock>,
    config: Config,
    resolver: PermissionResolver,
    cache: Arc<SessionPermissionCache>,

    state: RwLock<SessionState>,
    auth: RwLock<Option<AuthedUser>>,
    credential: Mutex<Option<Credential>>,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
    events: broadcast::Sender<SessionEvent>,
    cancel: Mutex<Option<CancellationToken>>,
    refresh_tx: Mutex<Option<mpsc::Sender<RefreshReason>>>,
}

impl SessionInner {
    pub(crate) fn authed_user(&self) -> Option<AuthedUser> {
        self.auth.read().clone()
    }

    pub(crate) fn update_role(&self, role: Role) {
        if let Some(auth) = self.auth.write().as_mut() {
            auth.role = role;
        }
    }

    pub(crate) fn feed_reconnect_delay(&self) -> std::time::Duration {
        self.config.resolver.feed_reconnect_delay()
    }

    /// Schedule one coalesced resolve-and-swap. A full queue means a refresh
    /// is already pending, which is exactly the coalescing the contract asks
    /// for.
    pub(crate) fn request_refresh(&self, reason: RefreshReason) {
        let tx = self.refresh_tx.lock().clone();
        if let Some(tx) = tx {
            match tx.try_send(reason) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("refresh channel closed, session tearing down");
                }
            }
        }
    }

    /// The one idempotent reconciliation operation every trigger funnels
    /// into. On failure the cache is replaced with the empty set under the
    /// same sequence number: fail closed, never stale or partial.
    pub(crate) async fn resolve_and_swap(&self) -> Result<()> {
        let user = self.authed_user().ok_or(Error::NotAuthenticated)?;
        let seq = self.cache.next_sequence();
        match self.resolver.resolve(&user.user_id).await {
            Ok(set) => {
                self.cache.store_if_fresh(seq, set);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    error = %e,
                    "resolution failed, caching empty permission set"
                );
                self.cache.store_if_fresh(seq, ResolvedPermissions::empty());
                Err(e)
            }
        }
    }

    pub(crate) fn record_heartbeat(&self) {
        let now = self.clock.now();
        *self.last_heartbeat.lock() = Some(now);
        tracing::trace!(at = %now, "session heartbeat");
    }

    fn login_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.slot.get(LOGIN_TIMESTAMP_KEY)?;
        match raw.parse::<DateTime<Utc>>() {
            Ok(ts) => Some(ts),
            Err(e) => {
                // An unreadable timestamp cannot prove the session is still
                // inside its ceiling; callers treat `None`-after-login as a
                // breach.
                tracing::warn!(error = %e, raw, "corrupt login timestamp in session slot");
                None
            }
        }
    }

    /// Clear all local session state, then fire the best-effort server
    /// sign-out. Idempotent; only the first call emits an event.
    pub(crate) async fn teardown(&self, event: SessionEvent) {
        {
            let mut state = self.state.write();
            if *state == SessionState::LoggedOut {
                return;
            }
            *state = SessionState::LoggedOut;
        }

        self.cache.clear();
        self.slot.remove(LOGIN_TIMESTAMP_KEY);
        *self.auth.write() = None;
        *self.credential.lock() = None;
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        self.refresh_tx.lock().take();

        tracing::info!(?event, "session torn down");
        let _ = self.events.send(event);

        // Local state is already gone; a failure here must not resurrect the
        // session.
        if let Err(e) = self.store.sign_out().await {
            tracing::warn!(error = %e, "server sign-out failed after local teardown");
        }
    }

    fn max_session(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.session.max_session())
            .unwrap_or(chrono::Duration::MAX)
    }

    fn refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.session.refresh_margin())
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Public handle for one client session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
    gate: AccessGate,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .finish()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn AccessStore>, config: Config) -> Self {
        Self::with_parts(store, config, Arc::new(MemorySlot::new()), Arc::new(SystemClock))
    }

    /// Full constructor for embedders that bring their own persisted slot
    /// (e.g. browser local storage) or clock.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn AccessStore>,
        config: Config,
        slot: Arc<dyn SessionSlot>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(SessionPermissionCache::new());
        let resolver = PermissionResolver::new(store.clone(), &config.resolver);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(SessionInner {
            store,
            slot,
            clock,
            config,
            resolver,
            cache: cache.clone(),
            state: RwLock::new(SessionState::Anonymous),
            auth: RwLock::new(None),
            credential: Mutex::new(None),
            last_heartbeat: Mutex::new(None),
            events,
            cancel: Mutex::new(None),
            refresh_tx: Mutex::new(None),
        });
        Self {
            inner,
            gate: AccessGate::new(cache),
        }
    }

    // ----- Lifecycle -----

    /// Authenticate this session for `user_id` with an already-issued
    /// credential. Any previous authentication on this manager is torn down
    /// first.
    pub async fn login(&self, user_id: UserId, credential: Credential) -> Result<()> {
        if self.state().is_authenticated() {
            self.inner.teardown(SessionEvent::LoggedOut).await;
        }
        *self.inner.state.write() = SessionState::Authenticating;

        let profile = match self.inner.store.profile(&user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                *self.inner.state.write() = SessionState::Anonymous;
                return Err(e);
            }
        };

        let now = self.inner.clock.now();
        self.inner
            .slot
            .put(LOGIN_TIMESTAMP_KEY, now.to_rfc3339());
        *self.inner.auth.write() = Some(AuthedUser {
            user_id: user_id.clone(),
            role: profile.role,
        });
        *self.inner.credential.lock() = Some(credential);
        self.inner.record_heartbeat();
        *self.inner.state.write() = SessionState::Authenticated;
        let _ = self.inner.events.send(SessionEvent::LoggedIn);

        tracing::info!(user_id = %user_id, role = %profile.role, "session authenticated");

        // Initial population. A failed resolution leaves the fail-closed
        // empty set in place; the session stays up and the retry paths
        // (explicit refresh, feed, focus) recover it.
        if let Err(e) = self.inner.resolve_and_swap().await {
            tracing::warn!(error = %e, "initial permission resolution failed");
        }

        self.spawn_background_tasks();
        Ok(())
    }

    /// Explicit logout. Local state is cleared synchronously; the server
    /// sign-out afterwards is best effort.
    pub async fn logout(&self) {
        self.inner.teardown(SessionEvent::LoggedOut).await;
    }

    /// Caller-triggered re-resolution of the permission set.
    pub async fn refresh_permissions(&self) -> Result<()> {
        if !self.state().is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        self.inner.resolve_and_swap().await
    }

    /// The tab/window became visible again: emit one heartbeat and one
    /// re-resolution to correct for events missed while backgrounded.
    pub fn notify_focus_regained(&self) {
        if !self.state().is_authenticated() {
            return;
        }
        self.inner.record_heartbeat();
        self.inner.request_refresh(RefreshReason::FocusRegained);
    }

    // ----- Queries -----

    #[must_use]
    pub fn has_permission(&self, key: &str) -> bool {
        self.gate.has_permission(key)
    }

    #[must_use]
    pub fn can_access_page(&self, page: &str) -> bool {
        self.gate.can_access_page(page)
    }

    /// Snapshot of the current resolved set.
    #[must_use]
    pub fn permissions(&self) -> Arc<ResolvedPermissions> {
        self.inner.cache.snapshot()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner
            .authed_user()
            .is_some_and(|auth| auth.role.is_admin())
    }

    #[must_use]
    pub fn user_role(&self) -> Option<Role> {
        self.inner.authed_user().map(|auth| auth.role)
    }

    #[must_use]
    pub fn login_timestamp(&self) -> Option<DateTime<Utc>> {
        self.inner.login_timestamp()
    }

    #[must_use]
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_heartbeat.lock()
    }

    /// Whether the last heartbeat falls within the configured liveness
    /// window.
    #[must_use]
    pub fn is_recently_active(&self) -> bool {
        let window = chrono::Duration::from_std(self.inner.config.session.liveness_window())
            .unwrap_or(chrono::Duration::MAX);
        self.last_heartbeat()
            .is_some_and(|at| self.inner.clock.now() - at <= window)
    }

    /// Subscribe to lifecycle events (`LoggedIn`, `LoggedOut`,
    /// `SessionExpired`).
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ----- Background tasks -----

    fn spawn_background_tasks(&self) {
        let cancel = CancellationToken::new();
        *self.inner.cancel.lock() = Some(cancel.clone());

        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_CHANNEL_CAPACITY);
        *self.inner.refresh_tx.lock() = Some(refresh_tx);

        tokio::spawn(refresh_driver(self.inner.clone(), refresh_rx, cancel.clone()));
        tokio::spawn(change_feed::run_listener(self.inner.clone(), cancel.clone()));
        tokio::spawn(expiry_checker(self.inner.clone(), cancel.clone()));
        tokio::spawn(credential_refresher(self.inner.clone(), cancel.clone()));
        tokio::spawn(heartbeat_ticker(self.inner.clone(), cancel.clone()));

        if let Some(interval) = self.inner.config.session.reconcile_interval() {
            tokio::spawn(reconciler(self.inner.clone(), interval, cancel));
        }
    }
}

/// Consumes refresh requests from every trigger source and performs one
/// resolve-and-swap per batch. Bursts of feed events coalesce here;
/// correctness only needs convergence to the final state.
async fn refresh_driver(
    inner: Arc<SessionInner>,
    mut rx: mpsc::Receiver<RefreshReason>,
    cancel: CancellationToken,
) {
    loop {
        let reason = tokio::select! {
            () = cancel.cancelled() => return,
            reason = rx.recv() => match reason {
                Some(reason) => reason,
                None => return,
            },
        };

        let mut coalesced = 0usize;
        while rx.try_recv().is_ok() {
            coalesced += 1;
        }
        tracing::debug!(?reason, coalesced, "running scheduled permission refresh");

        // Failures already left the fail-closed empty set in the cache.
        let _ = inner.resolve_and_swap().await;
    }
}

/// 60-second hard-ceiling checker. Elapsed time is recomputed from the
/// persisted timestamp on every tick, so process suspends cannot stretch the
/// session.
async fn expiry_checker(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.session.expiry_check_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // immediate first tick

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(login_ts) = inner.login_timestamp() else {
            // Slot missing or corrupt while authenticated: the ceiling can no
            // longer be proven unbreached, so fail closed.
            if inner.state.read().is_authenticated() {
                tracing::warn!("login timestamp unavailable, forcing session expiry");
                inner.teardown(SessionEvent::SessionExpired).await;
                return;
            }
            continue;
        };

        let elapsed = inner.clock.now() - login_ts;
        if elapsed >= inner.max_session() {
            tracing::info!(
                elapsed_secs = elapsed.num_seconds(),
                "hard session ceiling reached, forcing logout"
            );
            inner.teardown(SessionEvent::SessionExpired).await;
            return;
        }
    }
}

/// 60-second credential-refresh checker. Proactively refreshes when the
/// credential is within the configured margin of its expiry. Orthogonal to
/// the session ceiling: a refreshed credential never resets the 8-hour clock.
async fn credential_refresher(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.session.refresh_check_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let due = {
            let credential = inner.credential.lock();
            credential
                .as_ref()
                .is_some_and(|c| c.expires_within(inner.clock.now(), inner.refresh_margin()))
        };
        if !due {
            continue;
        }

        {
            let mut state = inner.state.write();
            if *state != SessionState::Authenticated {
                continue;
            }
            *state = SessionState::Refreshing;
        }

        match inner.store.refresh_credential().await {
            Ok(refreshed) => {
                *inner.credential.lock() = Some(refreshed);
                let mut state = inner.state.write();
                if *state == SessionState::Refreshing {
                    *state = SessionState::Authenticated;
                }
                tracing::debug!("credential refreshed");
            }
            Err(e) => {
                // Terminal: a refresh failure gets the same teardown as an
                // explicit logout, surfaced as expiry.
                tracing::error!(error = %e, "credential refresh failed, ending session");
                inner.teardown(SessionEvent::SessionExpired).await;
                return;
            }
        }
    }
}

/// 2-minute liveness heartbeat.
async fn heartbeat_ticker(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.session.heartbeat_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => inner.record_heartbeat(),
        }
    }
}

/// Optional coarse periodic reconciliation, the second safety net next to
/// focus regain.
async fn reconciler(
    inner: Arc<SessionInner>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => inner.request_refresh(RefreshReason::Reconcile),
        }
    }
}
