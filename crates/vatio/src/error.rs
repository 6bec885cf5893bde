//! Error taxonomy for trials.
//!
//! Failures split into two families: UI-automation failures
//! ([`VatioError::ElementNotFound`]) degrade a trial without aborting it,
//! while sampler and series failures abort the current trial only. No
//! variant is allowed to prevent session teardown from running.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type VatioResult<T> = Result<T, VatioError>;

/// Errors raised while running a trial.
#[derive(Debug, Error)]
pub enum VatioError {
    /// Required identity/session state missing or navigation failed.
    /// Fatal to the trial.
    #[error("Session launch failed: {message}")]
    SessionLaunch {
        /// Error message
        message: String,
    },

    /// The locator exhausted all root scopes and scroll budget.
    /// Non-fatal; drives the playback state machine to `Degraded`.
    #[error("Element not found: {message}")]
    ElementNotFound {
        /// Error message
        message: String,
    },

    /// The sampler process exited immediately or elevation failed.
    /// Fatal to the trial.
    #[error("Sampler failed to start: {message}")]
    SamplerStart {
        /// Error message
        message: String,
    },

    /// Graceful sampler stop failed and a forceful kill was required.
    /// Logged; the trial still completes if an output file exists.
    #[error("Sampler stop failed: {message}")]
    SamplerStop {
        /// Error message
        message: String,
    },

    /// Hardware classification or column selection failed. Fatal to the
    /// trial; must never default to a zero energy total.
    #[error("Series parse failed: {message}")]
    SeriesParse {
        /// Error message
        message: String,
    },

    /// A bounded wait expired.
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A session configuration violated its invariants.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Page evaluation or driver transport error.
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parse error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl VatioError {
    /// Create a session launch error
    #[must_use]
    pub fn session_launch(message: impl Into<String>) -> Self {
        Self::SessionLaunch {
            message: message.into(),
        }
    }

    /// Create an element-not-found error
    #[must_use]
    pub fn element_not_found(message: impl Into<String>) -> Self {
        Self::ElementNotFound {
            message: message.into(),
        }
    }

    /// Create a sampler start error
    #[must_use]
    pub fn sampler_start(message: impl Into<String>) -> Self {
        Self::SamplerStart {
            message: message.into(),
        }
    }

    /// Create a sampler stop error
    #[must_use]
    pub fn sampler_stop(message: impl Into<String>) -> Self {
        Self::SamplerStop {
            message: message.into(),
        }
    }

    /// Create a series parse error
    #[must_use]
    pub fn series_parse(message: impl Into<String>) -> Self {
        Self::SeriesParse {
            message: message.into(),
        }
    }

    /// Create an invalid-configuration error
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// True for failures that degrade a trial rather than abort it.
    #[must_use]
    pub const fn is_degradation(&self) -> bool {
        matches!(self, Self::ElementNotFound { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod error_display_tests {
        use super::*;

        #[test]
        fn test_session_launch_display() {
            let err = VatioError::session_launch("no session file");
            assert!(err.to_string().contains("Session launch"));
            assert!(err.to_string().contains("no session file"));
        }

        #[test]
        fn test_element_not_found_display() {
            let err = VatioError::element_not_found("speed label");
            assert!(err.to_string().contains("Element not found"));
        }

        #[test]
        fn test_sampler_start_display() {
            let err = VatioError::sampler_start("exited with stderr: denied");
            assert!(err.to_string().contains("Sampler failed to start"));
            assert!(err.to_string().contains("denied"));
        }

        #[test]
        fn test_series_parse_display() {
            let err = VatioError::series_parse("unknown hardware class");
            assert!(err.to_string().contains("Series parse"));
        }

        #[test]
        fn test_timeout_display() {
            let err = VatioError::Timeout { ms: 15_000 };
            assert!(err.to_string().contains("15000ms"));
        }
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn test_element_not_found_is_degradation() {
            assert!(VatioError::element_not_found("x").is_degradation());
            assert!(VatioError::Timeout { ms: 10 }.is_degradation());
        }

        #[test]
        fn test_fatal_errors_are_not_degradation() {
            assert!(!VatioError::session_launch("x").is_degradation());
            assert!(!VatioError::sampler_start("x").is_degradation());
            assert!(!VatioError::series_parse("x").is_degradation());
        }

        #[test]
        fn test_io_conversion() {
            let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
            let err: VatioError = io.into();
            assert!(matches!(err, VatioError::Io(_)));
        }

        #[test]
        fn test_json_conversion() {
            let json = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
            let err: VatioError = json.into();
            assert!(matches!(err, VatioError::Json(_)));
        }
    }
}
