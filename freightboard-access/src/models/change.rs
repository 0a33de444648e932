//! Change-feed event types.
//!
//! The external store pushes mutation notifications over a broadcast channel.
//! Delivery is at-most-effectively-once: events may be dropped across
//! reconnects, so consumers must pair the feed with an unconditional fallback
//! (focus regain, periodic reconciliation).

use serde::{Deserialize, Serialize};

use super::id::{PermissionId, UserId};
use super::user::Role;

/// Subscription scope: which table slice a listener cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeScope {
    /// Override rows belonging to one user.
    UserOverrides { user_id: UserId },
    /// Role-default rows for one role.
    RoleDefaults { role: Role },
    /// One user's own profile row.
    Profile { user_id: UserId },
}

/// Mutation kind carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One mutation notification from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub scope: ChangeScope,
    pub op: ChangeOp,
    /// Set for override and role-default events; `None` for profile events.
    pub permission_id: Option<PermissionId>,
}

impl ChangeEvent {
    /// Whether this event falls inside a subscription scope.
    #[must_use]
    pub fn matches(&self, scope: &ChangeScope) -> bool {
        self.scope == *scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ChangeEvent {
            scope: ChangeScope::UserOverrides {
                user_id: UserId::from("user00000001"),
            },
            op: ChangeOp::Insert,
            permission_id: Some(PermissionId::from("perm00000001")),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("user_overrides"));

        let decoded: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_scope_matching() {
        let user = UserId::from("user00000001");
        let event = ChangeEvent {
            scope: ChangeScope::RoleDefaults { role: Role::Viewer },
            op: ChangeOp::Update,
            permission_id: Some(PermissionId::from("perm00000001")),
        };

        assert!(event.matches(&ChangeScope::RoleDefaults { role: Role::Viewer }));
        assert!(!event.matches(&ChangeScope::RoleDefaults { role: Role::Manager }));
        assert!(!event.matches(&ChangeScope::UserOverrides { user_id: user }));
    }
}
