//! Error types for mate
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for mate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mate
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration, reported before any reconciliation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading the zone failed (transport, auth, timeout)
    #[error("Zone query failed ({provider}): {message}")]
    ProviderQuery {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Writing a change failed for a reason other than a conflict
    #[error("Zone write failed ({provider}): {message}")]
    ProviderWrite {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// The backend reported that a record in the change already exists
    ///
    /// The reconciler downgrades this to a warning.
    #[error("Zone change conflict ({provider}): {message}")]
    ProviderConflict {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Fetching endpoints from the registry failed
    #[error("Endpoint source error: {0}")]
    EndpointSource(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a zone query error
    pub fn query(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderQuery {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a zone write error
    pub fn write(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderWrite {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a zone conflict error
    pub fn conflict(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderConflict {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an endpoint source error
    pub fn endpoint_source(msg: impl Into<String>) -> Self {
        Self::EndpointSource(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this is an "already exists" conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ProviderConflict { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_distinguished_from_write_errors() {
        assert!(Error::conflict("google", "alreadyExists").is_conflict());
        assert!(!Error::write("google", "boom").is_conflict());
        assert!(!Error::query("google", "boom").is_conflict());
    }

    #[test]
    fn messages_name_the_provider() {
        let err = Error::query("google", "401 Unauthorized");
        assert_eq!(err.to_string(), "Zone query failed (google): 401 Unauthorized");
    }
}
