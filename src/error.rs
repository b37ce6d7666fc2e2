//! Error types for the widget SDK

use std::time::Duration;

use thiserror::Error;

/// Result type for widget operations
pub type Result<T> = std::result::Result<T, WidgetError>;

/// Widget error types
#[derive(Error, Debug)]
pub enum WidgetError {
    /// Credential is not a decodable three-segment token
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// The init payload carried no credential
    #[error("No token in init payload")]
    MissingCredential,

    /// No init message arrived within the bounded wait
    #[error("Widget init timed out ({}s)", .0.as_secs())]
    InitTimeout(Duration),

    /// The widget was destroyed
    #[error("Widget has been destroyed")]
    AlreadyDestroyed,

    /// An action needs a credential that does not exist yet
    #[error("Widget not initialized. Call init() first.")]
    NotInitialized,

    /// The feed API answered with a non-success status
    #[error("{message}")]
    PostRequestFailed { status: u16, message: String },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Host channel error
    #[error("Host channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WidgetError {
    /// Whether this is an ordinary handshake failure rather than a misconfiguration
    pub fn is_init_failure(&self) -> bool {
        matches!(
            self,
            WidgetError::MalformedCredential(_)
                | WidgetError::MissingCredential
                | WidgetError::InitTimeout(_)
                | WidgetError::Channel(_)
        )
    }
}

impl From<reqwest::Error> for WidgetError {
    fn from(err: reqwest::Error) -> Self {
        WidgetError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for WidgetError {
    fn from(err: serde_json::Error) -> Self {
        WidgetError::Serialization(err.to_string())
    }
}
