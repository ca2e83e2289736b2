//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(var: &str) -> Result<(), ApiError> {
        let missing: Result<(), ConfigError> = Err(ConfigError::MissingVar(var.to_string()));
        missing?;
        Ok(())
    }

    #[test]
    fn startup_failures_surface_through_api_error() {
        let err = load("FIRESTORE_API_KEY").unwrap_err();
        assert!(matches!(err, ApiError::Config(ConfigError::MissingVar(_))));
        assert!(err.to_string().contains("FIRESTORE_API_KEY"));
    }
}
