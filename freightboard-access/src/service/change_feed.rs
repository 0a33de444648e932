//! Change Feed Listener.
//!
//! Subscribes to mutation notifications for the session user's own override
//! rows, the role-default rows of their current role, and their own profile
//! row. Every matching event schedules the same idempotent resolve-and-swap
//! the fallback triggers use; which trigger fired is only logged.
//!
//! Delivery is at-most-effectively-once. A closed or failed feed is not
//! fatal: the last known-good cache stays in effect and the listener
//! reconnects after a delay, while focus-regain and periodic reconciliation
//! bound the staleness in the meantime.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::session::SessionInner;
use crate::models::ChangeScope;
use crate::store::ChangeFeed;

/// Why a resolve-and-swap was scheduled. Logged only; the reconciliation
/// logic is identical for every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshReason {
    FeedEvent,
    FocusRegained,
    Reconcile,
}

struct Feeds {
    overrides: ChangeFeed,
    role_defaults: ChangeFeed,
    profile: ChangeFeed,
}

async fn subscribe_all(
    inner: &SessionInner,
    user_id: &crate::models::UserId,
    role: crate::models::Role,
) -> crate::Result<Feeds> {
    let overrides = inner
        .store
        .subscribe(ChangeScope::UserOverrides {
            user_id: user_id.clone(),
        })
        .await?;
    let role_defaults = inner
        .store
        .subscribe(ChangeScope::RoleDefaults { role })
        .await?;
    let profile = inner
        .store
        .subscribe(ChangeScope::Profile {
            user_id: user_id.clone(),
        })
        .await?;
    Ok(Feeds {
        overrides,
        role_defaults,
        profile,
    })
}

/// Listener task for one session. Exits when the session is torn down.
pub(crate) async fn run_listener(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let Some(user) = inner.authed_user() else {
        return;
    };
    let user_id = user.user_id;
    // Tracked locally so a role change can re-subscribe the role-default
    // scope; the role itself determines which rows matter.
    let mut role = user.role;

    'resubscribe: loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut feeds = match subscribe_all(&inner, &user_id, role).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(error = %e, "change feed subscription failed, retrying");
                if sleep_or_cancelled(&inner, &cancel).await {
                    return;
                }
                continue 'resubscribe;
            }
        };

        tracing::debug!(user_id = %user_id, role = %role, "change feed subscribed");

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,

                event = feeds.overrides.recv() => match event {
                    Ok(event) => {
                        tracing::debug!(?event, "override change received");
                        inner.request_refresh(RefreshReason::FeedEvent);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "override feed closed, reconnecting");
                        if sleep_or_cancelled(&inner, &cancel).await {
                            return;
                        }
                        continue 'resubscribe;
                    }
                },

                event = feeds.role_defaults.recv() => match event {
                    Ok(event) => {
                        tracing::debug!(?event, "role default change received");
                        inner.request_refresh(RefreshReason::FeedEvent);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "role default feed closed, reconnecting");
                        if sleep_or_cancelled(&inner, &cancel).await {
                            return;
                        }
                        continue 'resubscribe;
                    }
                },

                event = feeds.profile.recv() => match event {
                    Ok(event) => {
                        tracing::debug!(?event, "profile change received");
                        match inner.store.profile(&user_id).await {
                            Ok(profile) => {
                                inner.update_role(profile.role);
                                inner.request_refresh(RefreshReason::FeedEvent);
                                if profile.role != role {
                                    tracing::info!(
                                        old_role = %role,
                                        new_role = %profile.role,
                                        "role changed, re-subscribing role defaults"
                                    );
                                    role = profile.role;
                                    continue 'resubscribe;
                                }
                            }
                            Err(e) => {
                                // Let the resolve path decide; it fails closed
                                // if the profile is still unreadable.
                                tracing::warn!(error = %e, "profile re-read failed after change event");
                                inner.request_refresh(RefreshReason::FeedEvent);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "profile feed closed, reconnecting");
                        if sleep_or_cancelled(&inner, &cancel).await {
                            return;
                        }
                        continue 'resubscribe;
                    }
                },
            }
        }
    }
}

/// Reconnect delay, abandoned early when the session tears down. Returns
/// `true` when cancelled.
async fn sleep_or_cancelled(inner: &SessionInner, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(inner.feed_reconnect_delay()) => false,
    }
}
