//! Description and contract requests against a recipient connector.
//!
//! Every call is independent: the caller threads handles and policy snippets
//! from one response into the next request. No policy is validated locally.

use crate::client::ConnectorClient;
use crate::error::{ConnectorError, Result};
use crate::handle::{Artifact, Handle, Resource};
use crate::transport::ApiRequest;

/// Path of the self-description endpoint.
pub const DESCRIPTION_PATH: &str = "/api/ids/description";
/// Path of the contract request endpoint.
pub const CONTRACT_PATH: &str = "/api/ids/contract";

/// Raw answer to a contract request.
#[derive(Debug, Clone)]
pub struct NegotiationResponse {
    pub status: u16,
    pub body: String,
}

impl NegotiationResponse {
    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Request the self-description of a connector or one of its elements.
///
/// With no `element`, the recipient describes itself.
pub fn describe(
    client: &ConnectorClient,
    recipient: Option<&str>,
    element: Option<&str>,
) -> Result<serde_json::Value> {
    let url = client.url(DESCRIPTION_PATH);
    let mut request = ApiRequest::post(&url, None);
    if let Some(recipient) = recipient {
        request = request.with_query("recipient", recipient);
    }
    if let Some(element) = element {
        request = request.with_query("elementId", element);
    }

    tracing::info!(recipient, element, "requesting description");
    let response = client.execute(&request)?;
    serde_json::from_slice(&response.body).map_err(|e| ConnectorError::ResponseFormat {
        url,
        detail: format!("description is not JSON: {e}"),
    })
}

/// Submit a usage policy to obtain access to `artifact` of `resource`.
pub fn negotiate_contract(
    client: &ConnectorClient,
    recipient: Option<&str>,
    resource: &Handle<Resource>,
    artifact: &Handle<Artifact>,
    download: bool,
    policy: &serde_json::Value,
) -> Result<NegotiationResponse> {
    let mut request = ApiRequest::post(
        client.url(CONTRACT_PATH),
        Some(serde_json::Value::Array(vec![policy.clone()])),
    );
    if let Some(recipient) = recipient {
        request = request.with_query("recipient", recipient);
    }
    request = request
        .with_query("resourceIds", resource.as_str())
        .with_query("artifactIds", artifact.as_str())
        .with_query("download", download.to_string());

    tracing::info!(
        recipient,
        resource = %resource,
        artifact = %artifact,
        download,
        "requesting contract"
    );
    let response = client.execute(&request)?;
    Ok(NegotiationResponse {
        status: response.status,
        body: response.text(),
    })
}

/// Take the first permission of the first contract offer in a description
/// and bind it to `artifact`.
pub fn extract_policy(
    description: &serde_json::Value,
    artifact: &Handle<Artifact>,
) -> Result<serde_json::Value> {
    let missing = |field: &str| ConnectorError::ResponseFormat {
        url: artifact.as_str().to_string(),
        detail: format!("description has no {field}"),
    };

    let offer = description
        .get("ids:contractOffer")
        .and_then(|o| o.get(0))
        .ok_or_else(|| missing("ids:contractOffer"))?;
    let permission = offer
        .get("ids:permission")
        .and_then(|p| p.get(0))
        .ok_or_else(|| missing("ids:permission"))?;

    let mut policy = permission.clone();
    match policy.as_object_mut() {
        Some(obj) => {
            obj.insert(
                "ids:target".to_string(),
                serde_json::Value::String(artifact.as_str().to_string()),
            );
        }
        None => return Err(missing("permission object")),
    }
    Ok(policy)
}
