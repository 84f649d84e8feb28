//! Connector client error types.

use std::path::PathBuf;

/// Errors that can occur while talking to a connector.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}{}", message_suffix(.message))]
    Request {
        url: String,
        status: u16,
        /// Human-readable message recovered from a JSON error body, if any.
        message: Option<String>,
        body: String,
    },

    /// A link referenced a handle the server does not know.
    #[error("stale handle in link request to {url}{}", message_suffix(.message))]
    StaleHandle {
        url: String,
        message: Option<String>,
    },

    /// The response lacked a header or field the caller depends on.
    #[error("unexpected response from {url}: {detail}")]
    ResponseFormat { url: String, detail: String },

    /// A URI could not be interpreted as an entity handle.
    #[error("invalid handle '{uri}': {detail}")]
    InvalidHandle { uri: String, detail: String },

    /// A provisioning plan is malformed.
    #[error("invalid provisioning plan: {detail}")]
    InvalidPlan { detail: String },

    /// A contract validity window does not fit the calendar.
    #[error("contract window of {days} days is out of range")]
    ContractWindow { days: i64 },

    /// The request never produced a response.
    #[error("transport error for {url}: {detail}")]
    Transport { url: String, detail: String },

    /// Writing fetched data to disk failed.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectorError {
    /// HTTP status carried by the error, if it came from a server response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectorError::Request { status, .. } => Some(*status),
            ConnectorError::StaleHandle { .. } => Some(404),
            _ => None,
        }
    }

    /// Whether the server reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_display_includes_server_message() {
        let err = ConnectorError::Request {
            url: "https://c/api/catalogs".into(),
            status: 400,
            message: Some("bad payload".into()),
            body: "{}".into(),
        };
        assert_eq!(
            err.to_string(),
            "request to https://c/api/catalogs failed with status 400: bad payload"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn stale_handle_counts_as_not_found() {
        let err = ConnectorError::StaleHandle {
            url: "https://c/api/catalogs/x/resources".into(),
            message: None,
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "stale handle in link request to https://c/api/catalogs/x/resources"
        );
    }
}
