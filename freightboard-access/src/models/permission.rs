//! Permission catalog, role defaults and per-user overrides.
//!
//! Three tables feed permission resolution:
//! - `Permission`: the static catalog of authorizable capabilities
//! - `RoleDefault`: per-role baseline grants
//! - `UserOverride`: per-user pins that beat the role default in both
//!   directions (explicit grant or explicit deny)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use super::id::{OverrideId, PermissionId, UserId};
use super::user::Role;
use crate::Error;

/// A stable, dotted permission key (e.g. `page.users`, `action.invoice.export`).
///
/// Keys stay opaque strings at the boundary; validation only enforces the
/// dotted-namespace shape so typos fail loudly at seeding time instead of
/// silently never matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Parse and validate a permission key.
    ///
    /// Valid keys are non-empty dot-separated segments of lowercase ASCII
    /// alphanumerics and underscores.
    pub fn parse(key: &str) -> crate::Result<Self> {
        let valid = !key.is_empty()
            && key.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            });

        if valid {
            Ok(Self(key.to_string()))
        } else {
            Err(Error::InvalidPermissionKey(key.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Lets a `HashSet<PermissionKey>` answer `&str` lookups without allocating;
// sound because the derived `Hash`/`Eq` delegate to the inner string.
impl std::borrow::Borrow<str> for PermissionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for PermissionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the permission catalog.
///
/// Rows are seeded once and rarely change. `active = false` removes the key
/// from every resolution regardless of role defaults or overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub key: PermissionKey,
    pub name: String,
    pub description: String,
    pub category: String,
    pub active: bool,
}

impl Permission {
    pub fn new(key: &str, name: &str, description: &str, category: &str) -> crate::Result<Self> {
        Ok(Self {
            id: PermissionId::new(),
            key: PermissionKey::parse(key)?,
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            active: true,
        })
    }
}

/// Baseline grant of one permission for one role.
///
/// Unique per (role, `permission_id`). An absent row means "not granted".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefault {
    pub role: Role,
    pub permission_id: PermissionId,
    pub granted: bool,
}

/// Per-user, per-permission explicit grant or deny.
///
/// Unique per (`user_id`, `permission_id`). Presence of a row, regardless of
/// its `granted` value, pins the user's membership for that permission and
/// makes the role default irrelevant. Deleting the row unpins the user back
/// to the role default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverride {
    pub id: OverrideId,
    pub user_id: UserId,
    pub permission_id: PermissionId,
    pub granted: bool,
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl UserOverride {
    #[must_use]
    pub fn new(
        user_id: UserId,
        permission_id: PermissionId,
        granted: bool,
        granted_by: UserId,
    ) -> Self {
        Self {
            id: OverrideId::new(),
            user_id,
            permission_id,
            granted,
            granted_by,
            granted_at: Utc::now(),
            notes: None,
        }
    }
}

/// The transient, session-scoped set of permission keys currently granted to
/// one authenticated user. Never persisted; replaced atomically as a whole on
/// every successful resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermissions {
    keys: HashSet<PermissionKey>,
}

impl ResolvedPermissions {
    #[must_use]
    pub fn new(keys: HashSet<PermissionKey>) -> Self {
        Self { keys }
    }

    /// The fail-closed value: no permissions at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Membership by key. A hash lookup, cheap enough for every gate query.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionKey> {
        self.keys.iter()
    }
}

impl FromIterator<PermissionKey> for ResolvedPermissions {
    fn from_iter<T: IntoIterator<Item = PermissionKey>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_valid() {
        assert!(PermissionKey::parse("page.dashboard").is_ok());
        assert!(PermissionKey::parse("action.invoice.export_pdf").is_ok());
        assert!(PermissionKey::parse("page2.users").is_ok());
    }

    #[test]
    fn test_permission_key_invalid() {
        assert!(PermissionKey::parse("").is_err());
        assert!(PermissionKey::parse("page.").is_err());
        assert!(PermissionKey::parse(".dashboard").is_err());
        assert!(PermissionKey::parse("Page.Dashboard").is_err());
        assert!(PermissionKey::parse("page dashboard").is_err());
    }

    #[test]
    fn test_permission_new_validates_key() {
        assert!(Permission::new("page.users", "Users", "User management", "pages").is_ok());
        assert!(Permission::new("Not A Key", "x", "x", "x").is_err());
    }

    #[test]
    fn test_resolved_permissions_membership() {
        let resolved: ResolvedPermissions = ["page.dashboard", "page.shipments"]
            .iter()
            .map(|k| PermissionKey::parse(k).unwrap())
            .collect();

        assert!(resolved.contains("page.dashboard"));
        assert!(!resolved.contains("page.configuration"));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_contains_matches_exact_key_only() {
        let resolved: ResolvedPermissions = ["page.users"]
            .iter()
            .map(|k| PermissionKey::parse(k).unwrap())
            .collect();

        assert!(resolved.contains("page.users"));
        assert!(!resolved.contains("page.user"));
        assert!(!resolved.contains("page.users.list"));
        assert!(!resolved.contains(""));
    }

    #[test]
    fn test_resolved_permissions_empty_is_fail_closed() {
        let resolved = ResolvedPermissions::empty();
        assert!(resolved.is_empty());
        assert!(!resolved.contains("page.dashboard"));
    }
}
