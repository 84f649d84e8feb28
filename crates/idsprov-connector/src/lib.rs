//! Client for provisioning app offers on an IDS dataspace connector.
//!
//! Entities are created one request at a time; the connector answers each
//! creation with a handle (the entity URI) that later requests use to link
//! entities into an offer graph. Handles are typed, so only associations the
//! connector accepts can be expressed.
//!
//! ## Modules
//!
//! - [`handle`]: Entity kinds, typed handles and the relation catalogue
//! - [`payload`]: Creation payloads and offer templates
//! - [`transport`]: Request transport seam and the HTTPS implementation
//! - [`client`]: The connector client context
//! - [`factory`]: Entity creation
//! - [`link`]: Linking entities into collections
//! - [`workflow`]: Provisioning plans and their execution
//! - [`negotiation`]: Description and contract requests
//! - [`artifact`]: Artifact metadata and data download
//! - [`memory`]: In-memory connector for tests and dry runs

pub mod artifact;
pub mod client;
pub mod error;
pub mod factory;
pub mod handle;
pub mod link;
pub mod memory;
pub mod negotiation;
pub mod payload;
pub mod transport;
pub mod workflow;

pub use artifact::{download_artifact_data, fetch_artifact, ArtifactDownload, DataDigest};
pub use client::ConnectorClient;
pub use error::{ConnectorError, Result};
pub use factory::{create, create_raw};
pub use handle::{
    App, Artifact, Catalog, Contract, Endpoint, Entity, EntityKind, Handle, RawHandle, Relation,
    Representation, Resource, Rule,
};
pub use link::{link, link_raw};
pub use memory::MemoryConnector;
pub use negotiation::{describe, extract_policy, negotiate_contract, NegotiationResponse};
pub use payload::{Description, OfferTemplate};
pub use transport::{ConnectorSettings, HttpTransport, Transport};
pub use workflow::{
    FailurePolicy, OfferGraph, OfferSlots, ProvisionPlan, ProvisionReport, Provisioner, Slot,
};
