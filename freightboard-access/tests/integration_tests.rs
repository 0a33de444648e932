//! Integration tests for the access-control core
//!
//! End-to-end flows against the in-memory store: login, change-feed
//! convergence, fallback reconciliation, credential refresh and the hard
//! session ceiling.
//!
//! Run with: cargo test --test integration_tests

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use freightboard_access::{
    models::{Credential, Permission, Role, SessionEvent, SessionState, UserId, UserOverride, UserProfile},
    service::{Clock, ManualClock, SessionManager},
    store::MemoryStore,
    Config,
};

const PAGES: &[&str] = &[
    "page.dashboard",
    "page.shipments",
    "page.carriers",
    "page.invoices",
    "page.reports",
    "page.import",
    "page.users",
    "page.configuration",
];

/// Catalog of all dashboard pages, viewer granted dashboard + shipments,
/// manager additionally reports + invoices.
fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.seed_catalog(
        PAGES
            .iter()
            .map(|key| Permission::new(key, key, "", "pages").expect("valid key"))
            .collect(),
    );

    for key in ["page.dashboard", "page.shipments"] {
        let id = store.permission_id_for_key(key).unwrap();
        store.upsert_role_default(Role::Viewer, id.clone(), true);
        store.upsert_role_default(Role::Manager, id, true);
    }
    for key in ["page.reports", "page.invoices"] {
        let id = store.permission_id_for_key(key).unwrap();
        store.upsert_role_default(Role::Manager, id, true);
    }
    let configuration = store.permission_id_for_key("page.configuration").unwrap();
    store.upsert_role_default(Role::Viewer, configuration, false);

    Arc::new(store)
}

fn manager_for(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> SessionManager {
    SessionManager::with_parts(
        store.clone(),
        Config::default(),
        Arc::new(freightboard_access::store::MemorySlot::new()),
        clock.clone(),
    )
}

fn viewer_profile(store: &Arc<MemoryStore>) -> UserProfile {
    let profile = UserProfile::new("x@freightboard.test", "User X", Role::Viewer);
    store.put_profile(profile.clone());
    profile
}

fn credential(clock: &ManualClock, ttl: ChronoDuration) -> Credential {
    Credential::new("issued-at-login", clock.now() + ttl)
}

/// Let spawned listeners and tickers run; paused-clock runtimes auto-advance
/// through the sleeps instantly.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

#[tokio::test(start_paused = true)]
async fn test_login_populates_cache_and_gate() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    assert!(!session.is_authenticated());
    assert!(!session.can_access_page("dashboard"));

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.user_role(), Some(Role::Viewer));
    assert!(!session.is_admin());
    assert!(session.login_timestamp().is_some());

    assert!(session.can_access_page("dashboard"));
    assert!(session.can_access_page("shipments"));
    assert!(!session.can_access_page("configuration"));
    assert!(!session.can_access_page("unmapped_page"));
    assert!(session.has_permission("page.dashboard"));
    assert!(!session.has_permission("page.users"));

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_change_feed_converges_override_grant_and_revert() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    // Let the spawned feed listener subscribe before mutating.
    settle().await;
    assert!(!session.can_access_page("configuration"));

    // Admin pins configuration on for this user.
    let configuration = store.permission_id_for_key("page.configuration").unwrap();
    store.upsert_override(UserOverride::new(
        profile.id.clone(),
        configuration.clone(),
        true,
        UserId::new(),
    ));
    settle().await;
    assert!(session.can_access_page("configuration"));

    // Removing the pin reverts to the role default (denied).
    store.remove_override(&profile.id, &configuration);
    settle().await;
    assert!(!session.can_access_page("configuration"));

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_two_sessions_converge_independently() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let profile_a = viewer_profile(&store);
    let profile_b = UserProfile::new("y@freightboard.test", "User Y", Role::Viewer);
    store.put_profile(profile_b.clone());

    let session_a = manager_for(&store, &clock);
    let session_b = manager_for(&store, &clock);
    session_a
        .login(profile_a.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    session_b
        .login(profile_b.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    settle().await;

    let users_page = store.permission_id_for_key("page.users").unwrap();
    store.upsert_override(UserOverride::new(
        profile_a.id.clone(),
        users_page,
        true,
        UserId::new(),
    ));
    settle().await;

    // Only the targeted user's session picks up the override.
    assert!(session_a.can_access_page("users"));
    assert!(!session_b.can_access_page("users"));

    session_a.logout().await;
    session_b.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_focus_regain_recovers_missed_events() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();

    // The feed silently drops the mutation, as a disconnected feed would.
    store.set_emit_events(false);
    let configuration = store.permission_id_for_key("page.configuration").unwrap();
    store.upsert_override(UserOverride::new(
        profile.id.clone(),
        configuration,
        true,
        UserId::new(),
    ));
    settle().await;
    assert!(!session.can_access_page("configuration"));

    // Tab comes back to the foreground: unconditional re-resolution.
    session.notify_focus_regained();
    settle().await;
    assert!(session.can_access_page("configuration"));

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_explicit_refresh_and_admin_fast_path() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);

    let mut admin = UserProfile::new("admin@freightboard.test", "Admin", Role::Admin);
    admin.is_active = true;
    store.put_profile(admin.clone());

    session
        .login(admin.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();

    assert!(session.is_admin());
    // Admins see every active page, role defaults notwithstanding.
    for page in [
        "dashboard",
        "shipments",
        "carriers",
        "invoices",
        "reports",
        "import",
        "users",
        "configuration",
    ] {
        assert!(session.can_access_page(page), "admin denied {page}");
    }

    session.refresh_permissions().await.unwrap();
    assert_eq!(session.permissions().len(), PAGES.len());

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_deactivation_empties_permissions() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let mut profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    settle().await;
    assert!(session.can_access_page("dashboard"));

    profile.is_active = false;
    store.put_profile(profile.clone());
    settle().await;

    assert!(!session.can_access_page("dashboard"));
    assert!(session.permissions().is_empty());

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_role_change_resubscribes_role_defaults() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let mut profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    settle().await;
    assert!(!session.can_access_page("reports"));

    // Promotion to manager arrives through the profile feed.
    profile.role = Role::Manager;
    store.put_profile(profile.clone());
    settle().await;

    assert_eq!(session.user_role(), Some(Role::Manager));
    assert!(session.can_access_page("reports"));

    // A subsequent manager role-default edit reaches the re-subscribed feed.
    let carriers = store.permission_id_for_key("page.carriers").unwrap();
    store.upsert_role_default(Role::Manager, carriers, true);
    settle().await;
    assert!(session.can_access_page("carriers"));

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_fails_closed_then_recovers() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    assert!(session.can_access_page("dashboard"));

    store.set_fail_reads(true);
    assert!(session.refresh_permissions().await.is_err());
    // Fail closed: no stale grants survive a failed resolution.
    assert!(!session.can_access_page("dashboard"));
    assert!(session.is_authenticated());

    store.set_fail_reads(false);
    session.refresh_permissions().await.unwrap();
    assert!(session.can_access_page("dashboard"));

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_state_even_when_sign_out_fails() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    let mut events = session.subscribe_events();

    store.set_fail_sign_out(true);
    session.logout().await;

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(!session.is_authenticated());
    assert!(session.permissions().is_empty());
    assert!(session.login_timestamp().is_none());
    assert_eq!(session.user_role(), None);
    assert_eq!(store.sign_out_calls(), 1);
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap(),
        SessionEvent::LoggedOut
    );

    // Queries after logout stay denied.
    assert!(!session.can_access_page("dashboard"));
    assert!(session.refresh_permissions().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_hard_ceiling_expires_despite_fresh_credential() {
    // Scenario E: login at t0, credential refreshed around t0+7h, session
    // still forced out on the first tick after t0+8h.
    let store = seeded_store();
    store.set_credential_ttl(ChronoDuration::hours(24));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    session
        .login(
            profile.id.clone(),
            credential(&clock, ChronoDuration::hours(7) + ChronoDuration::minutes(4)),
        )
        .await
        .unwrap();
    let mut events = session.subscribe_events();

    // t0+7h: within the 5-minute margin, so the checker refreshes.
    clock.advance(ChronoDuration::hours(7));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(session.is_authenticated());
    assert_ne!(store.current_credential().token, "issued-at-login");

    // t0+8h+1s: ceiling breached on the next 60-second tick.
    clock.advance(ChronoDuration::hours(1) + ChronoDuration::seconds(1));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.permissions().is_empty());
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap(),
        SessionEvent::SessionExpired
    );
}

#[tokio::test(start_paused = true)]
async fn test_credential_refresh_failure_is_terminal() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    // Credential already inside the refresh margin at login.
    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::minutes(2)))
        .await
        .unwrap();
    let mut events = session.subscribe_events();
    store.set_fail_refresh(true);

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.login_timestamp().is_none());
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap(),
        SessionEvent::SessionExpired
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_liveness_classification() {
    let store = seeded_store();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let session = manager_for(&store, &clock);
    let profile = viewer_profile(&store);

    session
        .login(profile.id.clone(), credential(&clock, ChronoDuration::hours(24)))
        .await
        .unwrap();
    assert!(session.is_recently_active());

    // Six quiet minutes of wall clock: outside the 5-minute window.
    clock.advance(ChronoDuration::minutes(6));
    assert!(!session.is_recently_active());

    // Focus regain emits an immediate heartbeat.
    session.notify_focus_regained();
    assert!(session.is_recently_active());

    session.logout().await;
}
