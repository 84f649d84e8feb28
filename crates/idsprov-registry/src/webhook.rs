//! Simulated registry webhook events.
//!
//! The connector listens on `/api/webhook/registry` for push notifications
//! from the container registry. Building an event locally and posting it
//! exercises that listener without a real registry round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idsprov_connector::transport::ApiRequest;
use idsprov_connector::ConnectorClient;

use crate::error::{RegistryError, Result};
use crate::reference::ImageReference;

/// Path of the registry webhook listener.
pub const WEBHOOK_PATH: &str = "/api/webhook/registry";

/// Digest used when no push reported one.
pub const SAMPLE_DIGEST: &str =
    "sha256:84075fa0ee8106f8e2975dca79d3c6f9587b41afefa7aec57e76a2fc9506df6c";

/// Kinds of registry notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PushArtifact,
    PullArtifact,
    DeleteArtifact,
    UploadChart,
    DownloadChart,
    DeleteChart,
    ScanningCompleted,
    ScanningFailed,
    QuotaExceed,
    QuotaWarning,
    Replication,
}

/// A registry notification as the webhook listener expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// UNIX seconds.
    pub occur_at: i64,
    pub operator: String,
    pub event_data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub resources: Vec<ArtifactResource>,
    pub repository: Repository,
}

/// One pushed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResource {
    pub digest: String,
    pub tag: String,
    pub resource_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// UNIX seconds.
    pub date_created: i64,
    /// Repository name; the listener reads it as the resource id.
    pub name: String,
    pub namespace: String,
    pub repo_full_name: String,
    pub repo_type: String,
}

impl RegistryEvent {
    /// A `PUSH_ARTIFACT` event for the image of `reference`, occurring now.
    pub fn push_artifact(reference: &ImageReference, tag: &str, digest: Option<&str>) -> Self {
        RegistryEvent::push_artifact_at(reference, tag, digest, Utc::now())
    }

    /// A `PUSH_ARTIFACT` event occurring at `at`.
    pub fn push_artifact_at(
        reference: &ImageReference,
        tag: &str,
        digest: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        let timestamp = at.timestamp();
        let repository = reference.repository();
        let resource_id = reference.resource_id();

        RegistryEvent {
            event_type: EventType::PushArtifact,
            occur_at: timestamp,
            operator: "admin".to_string(),
            event_data: EventData {
                resources: vec![ArtifactResource {
                    digest: digest.unwrap_or(SAMPLE_DIGEST).to_string(),
                    tag: tag.to_string(),
                    resource_url: format!("{}/{repository}/{resource_id}", reference.registry()),
                }],
                repository: Repository {
                    date_created: timestamp,
                    name: resource_id.to_string(),
                    namespace: repository.to_string(),
                    repo_full_name: format!("{repository}/{resource_id}"),
                    repo_type: "private".to_string(),
                },
            },
        }
    }

    /// Check the fields the listener requires.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: &str| RegistryError::InvalidEvent {
            detail: detail.to_string(),
        };
        if self.event_data.resources.is_empty() {
            return Err(invalid("no resources"));
        }
        let name = self.event_data.repository.name.trim();
        if name.is_empty() {
            return Err(invalid("repository name is empty"));
        }
        if uuid::Uuid::parse_str(name).is_err() {
            return Err(invalid(&format!(
                "repository name '{name}' is not a resource id"
            )));
        }
        Ok(())
    }
}

/// Validate `event` and post it to the connector's webhook listener.
///
/// Returns the listener's response body.
pub fn send_event(client: &ConnectorClient, event: &RegistryEvent) -> Result<String> {
    event.validate()?;
    let body = serde_json::to_value(event)?;
    tracing::info!(
        event = ?event.event_type,
        repository = %event.event_data.repository.repo_full_name,
        "sending simulated registry event"
    );
    let response = client.execute(&ApiRequest::post(client.url(WEBHOOK_PATH), Some(body)))?;
    tracing::info!(status = response.status, "registry event accepted");
    Ok(response.text())
}
