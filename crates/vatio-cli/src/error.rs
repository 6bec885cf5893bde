//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Experiment execution error
    #[error("Experiment failed: {message}")]
    Execution {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vatio library error
    #[error("Vatio error: {0}")]
    Vatio(#[from] vatio::VatioError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an execution error
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliError::config("unknown configuration");
        assert_eq!(err.to_string(), "Configuration error: unknown configuration");

        let err = CliError::execution("sampler refused");
        assert_eq!(err.to_string(), "Experiment failed: sampler refused");
    }

    #[test]
    fn test_vatio_error_converts() {
        let err: CliError = vatio::VatioError::invalid_config("bad speed").into();
        assert!(matches!(err, CliError::Vatio(_)));
        assert!(err.to_string().contains("bad speed"));
    }
}
