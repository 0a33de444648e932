//! Permission resolution and session-scoped access control for the
//! Freightboard dashboard.
//!
//! A role-based default permission matrix combined with per-user explicit
//! overrides, resolved into a per-session permission set that stays fresh
//! through a realtime change feed plus focus-regain and periodic fallbacks,
//! under a hard 8-hour session ceiling with a liveness heartbeat.
//!
//! Entry points: [`SessionManager`] for a session's lifecycle and queries,
//! [`store::AccessStore`] for wiring in a backend, [`store::MemoryStore`] for
//! tests and headless embedders.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use service::{AccessGate, PermissionResolver, SessionManager, SessionPermissionCache};
