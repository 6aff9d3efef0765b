// relay-core/src/errors.rs
use crate::models::catalog::PowerTier;
use crate::providers::ProviderId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while serving a chat or build request.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The backend answered with a non-success HTTP status.
    #[error("Provider {provider} error {status}: {body}")]
    ProviderHttp {
        provider: ProviderId,
        status: u16,
        body: String,
    },

    /// The backend answered 2xx but no completion text could be extracted.
    #[error("Provider {provider} returned empty content")]
    ProviderEmptyResponse { provider: ProviderId },

    /// The call exceeded its deadline and was aborted.
    #[error("Provider {provider} timed out after {timeout_ms} ms")]
    Timeout { provider: ProviderId, timeout_ms: u64 },

    /// Transport-level failure (connect, TLS, body read).
    #[error("Provider {provider} request failed: {source}")]
    Network {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered 2xx with a body we could not decode.
    #[error("Provider {provider} returned an invalid response: {message}")]
    InvalidResponse {
        provider: ProviderId,
        message: String,
    },

    /// A sanitized artifact path still resolved outside the owner's sandbox.
    #[error("Invalid output path detected: {}", .0.display())]
    InvalidOutputPath(PathBuf),

    /// No model in the catalog can serve the owner.
    #[error("No available model for provider {provider} (tier {power_tier}). Check the model catalog.")]
    NoAvailableModel {
        provider: ProviderId,
        power_tier: PowerTier,
    },

    #[error("No adapter registered for provider '{0}'")]
    UnknownProvider(String),

    /// Error related to configuration or catalog loading.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Rejected user input (too long, unknown model, ...).
    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RelayError::Validation(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelayError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
