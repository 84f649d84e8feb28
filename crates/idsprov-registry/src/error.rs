//! Registry error types.

use idsprov_connector::ConnectorError;

/// Errors that can occur while publishing images or posting registry events.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A required setting is absent or empty.
    #[error("missing configuration: {field}")]
    Configuration { field: String },

    /// The container engine rejected a command.
    #[error("container engine command '{command}' failed: {detail}")]
    Engine { command: String, detail: String },

    /// A push was attempted without a successful login.
    #[error("push to {registry} requires a successful login")]
    LoginRequired { registry: String },

    /// A registry event is missing a field the listener requires.
    #[error("invalid registry event: {detail}")]
    InvalidEvent { detail: String },

    /// Posting to the connector failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    pub(crate) fn missing(field: &str) -> Self {
        RegistryError::Configuration {
            field: field.to_string(),
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
