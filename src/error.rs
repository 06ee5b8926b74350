//! Error types and handling for the travel companion

use thiserror::Error;

/// Main error type for the travel companion pipeline
#[derive(Error, Debug)]
pub enum CompanionError {
    /// Configuration-related errors (missing credentials, bad settings)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Oracle communication errors
    #[error("Oracle error: {message}")]
    Oracle { message: String },

    /// An oracle call did not answer within its client-side timeout
    #[error("Timed out after {seconds}s waiting for {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// The place-lookup oracle explicitly found nothing
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The oracle does not offer the requested capability
    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl CompanionError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new oracle error
    pub fn oracle<S: Into<String>>(message: S) -> Self {
        Self::Oracle {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Hard configuration errors are never retried or degraded around.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, CompanionError::Config { .. })
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CompanionError::Config { message } => {
                format!("The assistant is not configured correctly: {message}. Please check your config file and API keys.")
            }
            CompanionError::Oracle { .. } | CompanionError::Timeout { .. } => {
                "Sorry, I can't reach the assistant right now. Please try again in a moment."
                    .to_string()
            }
            CompanionError::NotFound { message } => format!("Nothing found: {message}"),
            CompanionError::Unsupported { message } => message.clone(),
            CompanionError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            CompanionError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
            CompanionError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            CompanionError::General { message } => message.clone(),
        }
    }
}

impl From<anyhow::Error> for CompanionError {
    fn from(err: anyhow::Error) -> Self {
        CompanionError::cache(format!("{err:#}"))
    }
}

impl From<reqwest_middleware::Error> for CompanionError {
    fn from(err: reqwest_middleware::Error) -> Self {
        CompanionError::oracle(err.to_string())
    }
}

impl From<reqwest::Error> for CompanionError {
    fn from(err: reqwest::Error) -> Self {
        CompanionError::oracle(err.to_string())
    }
}
