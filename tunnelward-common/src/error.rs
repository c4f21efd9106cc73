//! Error types for `tunnelward`

use thiserror::Error;

/// Failure reported by a supervised subsystem.
///
/// Startup and runtime failures travel the same way: they end up in the
/// subsystem's single terminal outcome.
#[derive(Error, Debug)]
pub enum SubsystemError {
    /// The subsystem could not initialise (bind failure, bad credentials, ...)
    #[error("startup failed: {0}")]
    Startup(String),

    /// The subsystem was running and exited abnormally
    #[error("{0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The subsystem task panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl SubsystemError {
    pub fn startup(msg: impl Into<String>) -> Self {
        SubsystemError::Startup(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        SubsystemError::Runtime(msg.into())
    }

    /// True when the failure happened before the subsystem started serving.
    pub fn is_startup(&self) -> bool {
        matches!(self, SubsystemError::Startup(_))
    }
}

/// Invalid or contradictory configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value could not be parsed
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Two options conflict with each other
    #[error("{0}")]
    Conflict(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SubsystemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SubsystemError::startup("bind 127.0.0.1:53: address in use");
        assert!(err.to_string().contains("address in use"));
        assert!(err.is_startup());
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::other("test");
        let err: SubsystemError = io_err.into();
        assert!(matches!(err, SubsystemError::Io(_)));
        assert!(!err.is_startup());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("grace-period", "missing unit");
        assert_eq!(
            err.to_string(),
            "invalid value for grace-period: missing unit"
        );
    }
}
