//! Access Gate.
//!
//! Boolean allow/deny surface the rest of the dashboard calls. Queries are
//! answered from the session cache only; no store reads happen here, and the
//! contract never errors: anything unknown or unmapped is a deny.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

use super::session_cache::SessionPermissionCache;

/// Static page-name to permission-key table.
///
/// Pages not listed here are denied unconditionally; an unmapped name at
/// runtime is a programmer error in this table, not a user error.
static PAGE_PERMISSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("dashboard", "page.dashboard"),
        ("shipments", "page.shipments"),
        ("carriers", "page.carriers"),
        ("invoices", "page.invoices"),
        ("reports", "page.reports"),
        ("import", "page.import"),
        ("users", "page.users"),
        ("configuration", "page.configuration"),
    ])
});

/// Answers authorization queries against one session's cached set.
#[derive(Debug, Clone)]
pub struct AccessGate {
    cache: Arc<SessionPermissionCache>,
}

impl AccessGate {
    #[must_use]
    pub fn new(cache: Arc<SessionPermissionCache>) -> Self {
        Self { cache }
    }

    /// Whether the cached resolved set contains `key`.
    #[must_use]
    pub fn has_permission(&self, key: &str) -> bool {
        self.cache.has(key)
    }

    /// Whether the session may open `page`. Unmapped page names are denied
    /// and logged; this never errors.
    #[must_use]
    pub fn can_access_page(&self, page: &str) -> bool {
        match PAGE_PERMISSIONS.get(page) {
            Some(key) => self.cache.has(key),
            None => {
                tracing::warn!(page, "no permission mapping for page, denying");
                false
            }
        }
    }

    /// The permission key a page maps to, if any.
    #[must_use]
    pub fn page_permission(page: &str) -> Option<&'static str> {
        PAGE_PERMISSIONS.get(page).copied()
    }
}
