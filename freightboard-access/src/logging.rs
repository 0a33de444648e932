//! Tracing setup for embedders that do not install their own subscriber.
//!
//! The access core logs permission decisions, cache swaps and session
//! lifecycle transitions under the `freightboard_access` target. The default
//! filter runs this crate at the configured level and everything else at
//! `warn`, so an embedding dashboard does not drown access decisions in its
//! own noise. `RUST_LOG` overrides the whole filter when set.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Filter directives used when `RUST_LOG` is unset.
fn default_directives(level: &str) -> String {
    format!("warn,freightboard_access={level}")
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")))
}

/// Install the global subscriber.
///
/// `format = "json"` emits one structured record per event for log shipping;
/// anything else gets the human-readable form. With `file_path` set, output
/// goes to that file (append) instead of stdout.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let writer = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let registry = tracing_subscriber::registry().with(build_filter(&config.level));

    if config.format == "json" {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(writer).with_target(true))
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_crate_level() {
        assert_eq!(
            default_directives("debug"),
            "warn,freightboard_access=debug"
        );
    }

    #[test]
    fn test_directives_parse_for_known_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(EnvFilter::try_new(default_directives(level)).is_ok());
        }
    }

    #[test]
    fn test_unknown_level_rejected_by_filter() {
        assert!(EnvFilter::try_new(default_directives("loud")).is_err());
    }
}
