//! Entity kinds and the server-assigned handles that identify them.
//!
//! A handle is the URI the connector returns in the `Location` header when an
//! entity is created, e.g. `https://host/api/resources/<uuid>`. The client
//! never builds identifiers itself; it only recovers the entity kind and id
//! from a handle so that link requests can be addressed.
//!
//! [`Handle<E>`] carries the entity kind in its type. The [`Relation`] trait
//! is implemented only for the parent/child pairs the connector accepts, so
//! linking two entities that cannot be associated is a compile error.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// The kinds of entity the connector can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Catalog,
    Resource,
    Representation,
    App,
    Endpoint,
    Artifact,
    Contract,
    Rule,
}

impl EntityKind {
    /// All entity kinds, in dependency-friendly creation order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Catalog,
        EntityKind::Resource,
        EntityKind::Representation,
        EntityKind::App,
        EntityKind::Endpoint,
        EntityKind::Artifact,
        EntityKind::Contract,
        EntityKind::Rule,
    ];

    /// Plural collection name used in API paths.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Catalog => "catalogs",
            EntityKind::Resource => "resources",
            EntityKind::Representation => "representations",
            EntityKind::App => "apps",
            EntityKind::Endpoint => "endpoints",
            EntityKind::Artifact => "artifacts",
            EntityKind::Contract => "contracts",
            EntityKind::Rule => "rules",
        }
    }

    /// Look up a kind by its collection name.
    pub fn from_collection(collection: &str) -> Option<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.collection() == collection)
    }

    /// Path of the creation endpoint, relative to the connector base URL.
    pub fn create_path(self) -> String {
        format!("/api/{}", self.collection())
    }

    /// Whether `child` can be added to a collection under this kind.
    pub fn accepts(self, child: EntityKind) -> bool {
        matches!(
            (self, child),
            (EntityKind::Catalog, EntityKind::Resource)
                | (EntityKind::Resource, EntityKind::Catalog)
                | (EntityKind::Resource, EntityKind::Representation)
                | (EntityKind::Resource, EntityKind::Contract)
                | (EntityKind::Representation, EntityKind::App)
                | (EntityKind::Representation, EntityKind::Artifact)
                | (EntityKind::App, EntityKind::Endpoint)
                | (EntityKind::Contract, EntityKind::Rule)
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Catalog => "catalog",
            EntityKind::Resource => "resource",
            EntityKind::Representation => "representation",
            EntityKind::App => "app",
            EntityKind::Endpoint => "endpoint",
            EntityKind::Artifact => "artifact",
            EntityKind::Contract => "contract",
            EntityKind::Rule => "rule",
        };
        f.write_str(name)
    }
}

/// Type-level marker for an entity kind.
pub trait Entity {
    const KIND: EntityKind;
}

/// Grouping container of offered resources.
#[derive(Debug)]
pub enum Catalog {}
/// Offered data or service unit.
#[derive(Debug)]
pub enum Resource {}
/// Concrete technical manifestation of a resource.
#[derive(Debug)]
pub enum Representation {}
/// Containerized processing unit metadata.
#[derive(Debug)]
pub enum App {}
/// Network access point of an app.
#[derive(Debug)]
pub enum Endpoint {}
/// Payload exposed by a representation.
#[derive(Debug)]
pub enum Artifact {}
/// Usage-policy container with a validity window.
#[derive(Debug)]
pub enum Contract {}
/// Machine-readable usage-policy statement.
#[derive(Debug)]
pub enum Rule {}

impl Entity for Catalog {
    const KIND: EntityKind = EntityKind::Catalog;
}
impl Entity for Resource {
    const KIND: EntityKind = EntityKind::Resource;
}
impl Entity for Representation {
    const KIND: EntityKind = EntityKind::Representation;
}
impl Entity for App {
    const KIND: EntityKind = EntityKind::App;
}
impl Entity for Endpoint {
    const KIND: EntityKind = EntityKind::Endpoint;
}
impl Entity for Artifact {
    const KIND: EntityKind = EntityKind::Artifact;
}
impl Entity for Contract {
    const KIND: EntityKind = EntityKind::Contract;
}
impl Entity for Rule {
    const KIND: EntityKind = EntityKind::Rule;
}

/// A directed association: `Self` holds a collection of `Child`.
///
/// Must agree with [`EntityKind::accepts`].
pub trait Relation<Child: Entity>: Entity {}

impl Relation<Resource> for Catalog {}
impl Relation<Catalog> for Resource {}
impl Relation<Representation> for Resource {}
impl Relation<Contract> for Resource {}
impl Relation<App> for Representation {}
impl Relation<Artifact> for Representation {}
impl Relation<Endpoint> for App {}
impl Relation<Rule> for Contract {}

/// An untyped entity handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawHandle {
    uri: String,
    kind: EntityKind,
    id: String,
}

impl RawHandle {
    /// Interpret a server-issued URI as a handle.
    ///
    /// The URI must end in `/api/<collection>/<id>` with a known collection.
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim().trim_end_matches('/');
        let invalid = |detail: &str| ConnectorError::InvalidHandle {
            uri: uri.to_string(),
            detail: detail.to_string(),
        };

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() < 3 {
            return Err(invalid("expected .../api/<collection>/<id>"));
        }
        let n = segments.len();
        let (api, collection, id) = (segments[n - 3], segments[n - 2], segments[n - 1]);
        if api != "api" {
            return Err(invalid("expected .../api/<collection>/<id>"));
        }
        let kind = EntityKind::from_collection(collection)
            .ok_or_else(|| invalid(&format!("unknown collection '{collection}'")))?;
        if id.is_empty() {
            return Err(invalid("empty id"));
        }

        Ok(RawHandle {
            uri: trimmed.to_string(),
            kind,
            id: id.to_string(),
        })
    }

    /// The full URI.
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Entity kind recovered from the collection segment.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The server-assigned id (last path segment).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// URL of this entity's collection of `child` entities.
    pub fn relation_url(&self, child: EntityKind) -> String {
        format!("{}/{}", self.uri, child.collection())
    }

    /// Narrow to a typed handle, checking the kind.
    pub fn typed<E: Entity>(self) -> Result<Handle<E>> {
        if self.kind != E::KIND {
            return Err(ConnectorError::InvalidHandle {
                uri: self.uri,
                detail: format!("expected {} handle, found {}", E::KIND, self.kind),
            });
        }
        Ok(Handle {
            raw: self,
            _entity: PhantomData,
        })
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// A handle to an entity of kind `E`.
pub struct Handle<E> {
    raw: RawHandle,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Handle<E> {
    /// Parse a URI as a handle of kind `E`.
    pub fn parse(uri: &str) -> Result<Self> {
        RawHandle::parse(uri)?.typed()
    }

    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    pub fn id(&self) -> &str {
        self.raw.id()
    }

    pub fn raw(&self) -> &RawHandle {
        &self.raw
    }

    pub fn into_raw(self) -> RawHandle {
        self.raw
    }
}

impl<E> Clone for Handle<E> {
    fn clone(&self) -> Self {
        Handle {
            raw: self.raw.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> PartialEq for Handle<E> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<E> Eq for Handle<E> {}

impl<E> fmt::Debug for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.raw.uri)
    }
}

impl<E> fmt::Display for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw.uri)
    }
}
