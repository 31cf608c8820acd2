//! Error types for the relay pipeline.

use thiserror::Error;

/// Errors raised by a delivery provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed (transport, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider options are invalid. Fatal at construction time.
    #[error("Invalid provider configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Whether another attempt at the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_) | Self::Serialization(_) => false,
        }
    }
}

/// Errors raised while turning an alert into wire messages.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Nothing to put in the message header.
    #[error("alert {fingerprint} has no title, summary or alertname")]
    MissingTitle { fingerprint: String },

    /// Rendered message exceeds the backend's size limit.
    #[error("message for alert {fingerprint} is {size} bytes, limit is {limit}")]
    TooLarge {
        fingerprint: String,
        size: usize,
        limit: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by [`crate::Notifier::dispatch`].
#[derive(Debug, Error)]
pub enum NotifyError {
    /// No provider serves the requested room.
    #[error("no provider configured for room: {0}")]
    NoProvider(String),

    /// The provider rejected the whole batch.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
