//! Error types for Ratsarchiv.
//!
//! Library crates use [`HarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Ratsarchiv operations.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during page navigation.
    #[error("network error: {0}")]
    Network(String),

    /// Markup parsing or label interpretation error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Marker, cache, or ledger persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad label, invalid unit, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Navigation did not change the observed unit.
    #[error("navigation stalled at {label}")]
    NavigationStall { label: String },

    /// A unit page yielded no records.
    #[error("no records found for {unit}")]
    ExtractionEmpty { unit: String },

    /// A document fetch exceeded its wall-clock budget.
    #[error("download timed out after {budget_ms} ms")]
    DownloadTimeout { budget_ms: u64 },

    /// Transport or HTTP failure while fetching a document.
    #[error("download failed: {0}")]
    DownloadTransport(String),

    /// Sign-in failed; the run cannot continue.
    #[error("authentication failed: {0}")]
    CriticalAuthFailure(String),

    /// The source host name does not resolve.
    #[error("host not resolvable: {0}")]
    UnresolvableHost(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; worth another attempt.
    Retryable,
    /// Will not improve on retry, but the run may continue.
    Permanent,
    /// Stop retrying immediately and abort the run.
    Critical,
}

impl HarvestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for retry and abort decisions.
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::CriticalAuthFailure(_) | Self::UnresolvableHost(_) => ErrorClass::Critical,
            Self::Network(_) | Self::DownloadTransport(_) | Self::DownloadTimeout { .. } => {
                ErrorClass::Retryable
            }
            Self::Io { .. } => ErrorClass::Retryable,
            Self::Config { .. }
            | Self::Parse { .. }
            | Self::Storage(_)
            | Self::Validation { .. }
            | Self::NavigationStall { .. }
            | Self::ExtractionEmpty { .. } => ErrorClass::Permanent,
        }
    }

    /// Whether this error must terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        self.classify() == ErrorClass::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = HarvestError::config("missing calendar_url");
        assert_eq!(err.to_string(), "config error: missing calendar_url");

        let err = HarvestError::DownloadTimeout { budget_ms: 10_000 };
        assert!(err.to_string().contains("10000 ms"));
    }

    #[test]
    fn auth_failure_is_critical() {
        let err = HarvestError::CriticalAuthFailure("login form still present".into());
        assert_eq!(err.classify(), ErrorClass::Critical);
        assert!(err.is_fatal());
    }

    #[test]
    fn unresolvable_host_is_critical() {
        let err = HarvestError::UnresolvableHost("https://rats.invalid/".into());
        assert_eq!(err.classify(), ErrorClass::Critical);
        assert!(err.is_fatal());

        // Classification never looks at message text.
        let err = HarvestError::Network("dns error: failed to lookup address information".into());
        assert_eq!(err.classify(), ErrorClass::Retryable);
    }

    #[test]
    fn stall_is_permanent_not_fatal() {
        let err = HarvestError::NavigationStall {
            label: "Kalender Januar 2024".into(),
        };
        assert_eq!(err.classify(), ErrorClass::Permanent);
        assert!(!err.is_fatal());
    }
}
