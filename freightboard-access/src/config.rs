use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Result;

/// Access-control core configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

/// Session lifecycle timings.
///
/// All checks are wall-clock based: elapsed time is recomputed from the
/// persisted login timestamp on every tick, so suspend/resume cannot stretch
/// a session past its ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard session ceiling in seconds (8 hours). Breach forces logout
    /// regardless of credential validity.
    pub max_session_secs: u64,
    /// Hard-expiry checker tick interval.
    pub expiry_check_secs: u64,
    /// Credential-refresh checker tick interval.
    pub refresh_check_secs: u64,
    /// Refresh the credential when it is within this margin of its expiry.
    pub refresh_margin_secs: u64,
    /// Heartbeat interval.
    pub heartbeat_secs: u64,
    /// A session counts as "currently active" when its last heartbeat is
    /// within this window.
    pub liveness_window_secs: u64,
    /// Optional coarse periodic re-resolution, a safety net on top of the
    /// change feed and focus-regain triggers. Disabled when `None`.
    pub reconcile_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_secs: 8 * 60 * 60,
            expiry_check_secs: 60,
            refresh_check_secs: 60,
            refresh_margin_secs: 5 * 60,
            heartbeat_secs: 2 * 60,
            liveness_window_secs: 5 * 60,
            reconcile_secs: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn max_session(&self) -> Duration {
        Duration::from_secs(self.max_session_secs)
    }

    #[must_use]
    pub const fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_secs)
    }

    #[must_use]
    pub const fn refresh_check_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_check_secs)
    }

    #[must_use]
    pub const fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    #[must_use]
    pub fn reconcile_interval(&self) -> Option<Duration> {
        self.reconcile_secs.map(Duration::from_secs)
    }
}

/// Resolution Engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Per-read timeout. A timed-out read fails the whole resolution closed.
    pub read_timeout_secs: u64,
    /// Reconnect delay after the change feed closes.
    pub feed_reconnect_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 10,
            feed_reconnect_secs: 5,
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub const fn feed_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.feed_reconnect_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (FREIGHTBOARD_SESSION_MAX_SESSION_SECS, etc.)
        builder = builder.add_source(
            Environment::with_prefix("FREIGHTBOARD")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from file path.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }
}
