//! Creation payloads for each entity kind.
//!
//! Every payload type is a serde struct whose JSON form is exactly what the
//! connector's creation endpoint accepts. `Default` yields the example offer
//! used by the remote provisioning flow; `OfferTemplate` bundles one payload
//! per entity and can be read from configuration, with missing fields filled
//! from those defaults.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::handle::{self, Entity};

/// A creation payload for entities of kind `Self::Entity`.
pub trait Description: Serialize {
    type Entity: Entity;
}

/// Default validity of a contract when no window is configured.
pub const DEFAULT_CONTRACT_DAYS: i64 = 240;

/// Usage policy allowing at most five uses of the target.
pub const N_TIMES_USAGE_POLICY: &str = r#"{
  "@context" : {
    "xsd" : "http://www.w3.org/2001/XMLSchema#",
    "ids" : "https://w3id.org/idsa/core/",
    "idsc" : "https://w3id.org/idsa/code/"
  },
  "@type" : "ids:Permission",
  "@id" : "https://w3id.org/idsa/autogen/permission/00f09a77-0f0f-474d-8198-5195ef55e0eb",
  "ids:title" : [ {
    "@value" : "Example Usage Policy",
    "@type" : "http://www.w3.org/2001/XMLSchema#string"
  } ],
  "ids:description" : [ {
    "@value" : "n-times-usage",
    "@type" : "http://www.w3.org/2001/XMLSchema#string"
  } ],
  "ids:action" : [ {
    "@id" : "https://w3id.org/idsa/code/USE"
  } ],
  "ids:constraint" : [ {
    "@type" : "ids:Constraint",
    "@id" : "https://w3id.org/idsa/autogen/constraint/e0a353a2-ef1d-4932-b3cf-a5a0a5a1455e",
    "ids:operator" : {
      "@id" : "https://w3id.org/idsa/code/LTEQ"
    },
    "ids:leftOperand" : {
      "@id" : "https://w3id.org/idsa/code/COUNT"
    },
    "ids:rightOperand" : {
      "@value" : "5",
      "@type" : "xsd:double"
    }
  } ]
}"#;

fn some(s: &str) -> Option<String> {
    Some(s.to_string())
}

/// Catalog payload. The connector accepts an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Description for CatalogDesc {
    type Entity = handle::Catalog;
}

/// Offered resource payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sovereign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

impl Default for ResourceDesc {
    fn default() -> Self {
        ResourceDesc {
            title: some("HelloWorldDataProcessingApp"),
            description: some("data app for processing data."),
            keywords: vec!["data".into(), "processing".into(), "fit".into()],
            publisher: some("https://fit.fraunhofer.de"),
            sovereign: some("https://fit.fraunhofer.de"),
            language: some("EN"),
            license: some("https://www.apache.org/licenses/LICENSE-2.0"),
            payment_method: some("free"),
        }
    }
}

impl Description for ResourceDesc {
    type Entity = handle::Resource;
}

/// Representation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepresentationDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_service: Option<String>,
}

impl Default for RepresentationDesc {
    fn default() -> Self {
        RepresentationDesc {
            title: some("Docker Representation"),
            description: some("This is the docker representation for the DataProcessingApp"),
            language: some("EN"),
            runtime_environment: some("docker"),
            distribution_service: some("https://binac.fit.fraunhofer.de"),
        }
    }
}

impl Description for RepresentationDesc {
    type Entity = handle::Representation;
}

/// Data app payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    /// `KEY=value` pairs separated by `;`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_config: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_usage_policies: Vec<String>,
}

impl Default for AppDesc {
    fn default() -> Self {
        AppDesc {
            title: some("DataApp Information"),
            description: some("This is the dataApp information for the DataProcessingApp."),
            docs: some("App-related human-readable documentation."),
            environment_variables: some("Env1=environmentvariable;Env2=environmentvariable2"),
            storage_config: some("/data/temp:/temp"),
            supported_usage_policies: vec!["PROVIDE_ACCESS".into()],
        }
    }
}

impl Description for AppDesc {
    type Entity = handle::App;
}

/// App endpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Endpoint role: `Input`, `Output` or `Status`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for EndpointDesc {
    fn default() -> Self {
        EndpointDesc {
            title: some("DataApp Input Endpoint"),
            description: some("This is the input endpoint for the DataProcessingApp."),
            location: some("/output"),
            media_type: some("application/json"),
            port: Some(80),
            protocol: some("HTTP/1.1"),
            endpoint_type: some("Output"),
            docs: some("https://app.swaggerhub.com/apis/app/1337"),
            info: some("More information about the endpoint"),
            path: some("/output"),
        }
    }
}

impl EndpointDesc {
    /// An untitled endpoint at `path` on `port`.
    pub fn at(path: &str, port: u16, endpoint_type: &str) -> Self {
        EndpointDesc {
            title: None,
            description: None,
            location: some(path),
            media_type: some("application/json"),
            port: Some(port),
            protocol: some("HTTP/1.1"),
            endpoint_type: some(endpoint_type),
            docs: some("https://app.swaggerhub.com/apis/app/1337"),
            info: some("Endpoint-related human-readable information"),
            path: some(path),
        }
    }
}

impl Description for EndpointDesc {
    type Entity = handle::Endpoint;
}

/// Artifact payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactDesc {
    pub title: String,
    pub description: String,
    /// Inline artifact content.
    pub value: String,
}

impl Description for ArtifactDesc {
    type Entity = handle::Artifact;
}

/// Contract payload: a validity window in RFC 3339 form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDesc {
    pub start: String,
    pub end: String,
}

impl ContractDesc {
    /// A window starting at `start` and lasting `days`.
    ///
    /// Fails with `ContractWindow` when the end falls outside the
    /// representable date range.
    pub fn window(start: DateTime<Utc>, days: i64) -> Result<Self> {
        let end = TimeDelta::try_days(days)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or(ConnectorError::ContractWindow { days })?;
        Ok(ContractDesc {
            start: start.to_rfc3339_opts(SecondsFormat::Millis, false),
            end: end.to_rfc3339_opts(SecondsFormat::Millis, false),
        })
    }

    /// A window starting now with the default length.
    pub fn from_now() -> Result<Self> {
        ContractDesc::window(Utc::now(), DEFAULT_CONTRACT_DAYS)
    }
}

impl Description for ContractDesc {
    type Entity = handle::Contract;
}

/// Rule payload; `value` is a JSON-LD policy document serialized as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: String,
}

impl Default for RuleDesc {
    fn default() -> Self {
        RuleDesc {
            title: None,
            description: None,
            value: N_TIMES_USAGE_POLICY.to_string(),
        }
    }
}

impl Description for RuleDesc {
    type Entity = handle::Rule;
}

/// One payload per entity of a complete app offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferTemplate {
    pub catalog: CatalogDesc,
    pub resource: ResourceDesc,
    pub representation: RepresentationDesc,
    pub app: AppDesc,
    /// Endpoints attached to the app, in creation order.
    pub endpoints: Vec<EndpointDesc>,
    pub artifact: ArtifactDesc,
    /// Fixed contract window; computed from the current time when absent.
    pub contract: Option<ContractDesc>,
    pub rule: RuleDesc,
}

impl Default for OfferTemplate {
    fn default() -> Self {
        OfferTemplate {
            catalog: CatalogDesc::default(),
            resource: ResourceDesc::default(),
            representation: RepresentationDesc::default(),
            app: AppDesc::default(),
            endpoints: vec![EndpointDesc::default()],
            artifact: ArtifactDesc::default(),
            contract: None,
            rule: RuleDesc::default(),
        }
    }
}

impl OfferTemplate {
    /// Example offer for a connector running on `localhost:8080`.
    pub fn local() -> Self {
        OfferTemplate {
            resource: ResourceDesc {
                title: some("DataProcessingApp"),
                ..ResourceDesc::default()
            },
            representation: RepresentationDesc {
                distribution_service: some("https://localhost:8080"),
                ..RepresentationDesc::default()
            },
            app: AppDesc {
                environment_variables: some("dbUser=sa;dbPasswd=passwd"),
                storage_config: some("-v /data"),
                ..AppDesc::default()
            },
            endpoints: vec![EndpointDesc {
                location: some("/input"),
                path: some("/input"),
                port: Some(5000),
                endpoint_type: some("Input"),
                ..EndpointDesc::default()
            }],
            artifact: ArtifactDesc {
                title: "DataApp Template".into(),
                description: "This is the template for the DataProcessingApp".into(),
                value: String::new(),
            },
            ..OfferTemplate::default()
        }
    }

    /// Example offer for the negotiation flow: two endpoints and an inline
    /// template artifact.
    pub fn negotiation() -> Self {
        OfferTemplate {
            resource: ResourceDesc {
                title: some("DataProcessingApp"),
                publisher: None,
                sovereign: None,
                language: None,
                license: None,
                payment_method: None,
                ..ResourceDesc::default()
            },
            representation: RepresentationDesc {
                title: None,
                description: None,
                language: None,
                ..RepresentationDesc::default()
            },
            app: AppDesc {
                title: some("Smart Data App for Example Usage"),
                description: some("data app for processing data."),
                ..AppDesc::default()
            },
            endpoints: vec![
                EndpointDesc::at("/input", 5000, "Status"),
                EndpointDesc::at("/output", 5000, "Input"),
            ],
            artifact: ArtifactDesc {
                value: "SOME APP TEMPLATE".into(),
                ..ArtifactDesc::default()
            },
            ..OfferTemplate::default()
        }
    }

    /// The configured contract window, or one starting now.
    pub fn contract_or_now(&self) -> Result<ContractDesc> {
        match &self.contract {
            Some(contract) => Ok(contract.clone()),
            None => ContractDesc::from_now(),
        }
    }
}
