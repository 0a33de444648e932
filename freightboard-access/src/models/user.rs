use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::UserId;

/// Dashboard role (closed set, baseline permission profile).
///
/// Kept as an enum rather than a string so that every dispatch over roles is
/// exhaustiveness-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator. Resolves to every active catalog key; role defaults and
    /// overrides cannot lock an admin out.
    Admin,

    /// Operations manager.
    Manager,

    /// Regular data-entry user.
    User,

    /// Read-only viewer.
    Viewer,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::User => "user",
            Self::Viewer => "viewer",
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// All roles, in descending privilege order.
    pub const ALL: [Self; 4] = [Self::Admin, Self::Manager, Self::User, Self::Viewer];
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "user" => Ok(Self::User),
            "viewer" => Ok(Self::Viewer),
            _ => Err(crate::Error::InvalidRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User profile row. Owned by profile management; the access-control core
/// only reads `role` and `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserProfile {
    #[must_use]
    pub fn new(email: &str, full_name: &str, role: Role) -> Self {
        Self {
            id: UserId::new(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
            is_active: true,
            last_login: None,
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
