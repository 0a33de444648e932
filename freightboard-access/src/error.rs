use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store read timed out")]
    Timeout,

    #[error("Change feed closed")]
    FeedClosed,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid permission key: {0}")]
    InvalidPermissionKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Recoverable errors leave the session alive with an empty (fail-closed)
    /// permission set; terminal errors force logout.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Timeout | Self::FeedClosed | Self::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Store("connection reset".to_string()).is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(Error::FeedClosed.is_retryable());

        assert!(!Error::CredentialRefresh("expired".to_string()).is_retryable());
        assert!(!Error::NotAuthenticated.is_retryable());
    }

    #[test]
    fn test_config_error_conversion() {
        let e: Error = config::ConfigError::Message("bad value".to_string()).into();
        assert!(matches!(e, Error::Config(_)));
        assert!(!e.is_retryable());
    }
}
