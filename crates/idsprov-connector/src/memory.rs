//! An in-memory connector.
//!
//! `MemoryConnector` implements [`Transport`] by answering requests from a
//! local store instead of the network. It follows the same routes and status
//! codes as a real connector closely enough to run whole provisioning and
//! negotiation flows, which makes it the backend for tests and dry runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Value};

use crate::error::Result;
use crate::handle::{EntityKind, RawHandle};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

#[derive(Debug, Clone)]
struct StoredEntity {
    kind: EntityKind,
    fields: Value,
}

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<String, StoredEntity>,
    /// (parent, child) pairs in insertion order.
    links: Vec<(String, String)>,
    artifact_data: BTreeMap<String, Vec<u8>>,
    failing: HashSet<EntityKind>,
    agreements: Vec<Value>,
    events: Vec<Value>,
}

impl State {
    fn children(&self, parent: &str, kind: EntityKind) -> Vec<String> {
        self.links
            .iter()
            .filter(|(p, c)| p == parent && self.kind_of(c) == Some(kind))
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn kind_of(&self, uri: &str) -> Option<EntityKind> {
        self.entities.get(uri).map(|e| e.kind)
    }
}

/// A connector that lives in process memory.
#[derive(Debug)]
pub struct MemoryConnector {
    base_url: String,
    state: Mutex<State>,
}

impl MemoryConnector {
    pub fn new(base_url: &str) -> Self {
        MemoryConnector {
            base_url: base_url.trim_end_matches('/').to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stored fields of the entity behind `uri`.
    pub fn entity(&self, uri: &str) -> Option<Value> {
        self.state().entities.get(uri).map(|e| e.fields.clone())
    }

    /// Number of entities of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state()
            .entities
            .values()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Handles of `kind` in the collection of `parent`.
    pub fn children(&self, parent: &str, kind: EntityKind) -> Vec<String> {
        self.state().children(parent, kind)
    }

    /// Handles of `kind` whose collection contains `child`.
    pub fn parents(&self, child: &str, kind: EntityKind) -> Vec<String> {
        let state = self.state();
        state
            .links
            .iter()
            .filter(|(p, c)| c == child && state.kind_of(p) == Some(kind))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Serve `data` for `GET {artifact}/data` instead of the artifact value.
    pub fn set_artifact_data(&self, artifact: &str, data: Vec<u8>) {
        self.state()
            .artifact_data
            .insert(artifact.to_string(), data);
    }

    /// Answer every future create request of `kind` with a server error.
    pub fn fail_creates(&self, kind: EntityKind) {
        self.state().failing.insert(kind);
    }

    pub fn agreement_count(&self) -> usize {
        self.state().agreements.len()
    }

    /// Registry events received on the webhook, oldest first.
    pub fn events(&self) -> Vec<Value> {
        self.state().events.clone()
    }

    fn create(&self, kind: EntityKind, body: Option<&Value>) -> ApiResponse {
        let mut state = self.state();
        if state.failing.contains(&kind) {
            return error(500, &format!("cannot persist {kind}"));
        }
        let fields = match body {
            Some(fields) if fields.is_object() => fields.clone(),
            _ => return error(400, "Invalid input."),
        };

        let uri = format!(
            "{}/api/{}/{}",
            self.base_url,
            kind.collection(),
            uuid::Uuid::new_v4()
        );
        state
            .entities
            .insert(uri.clone(), StoredEntity { kind, fields });
        ApiResponse {
            status: 201,
            location: Some(uri),
            body: b"{}".to_vec(),
        }
    }

    fn link(&self, parent: &str, child_kind: EntityKind, body: Option<&Value>) -> ApiResponse {
        let mut state = self.state();
        let Some(parent_kind) = state.kind_of(parent) else {
            return error(404, &format!("{parent} not found"));
        };
        if !parent_kind.accepts(child_kind) {
            return error(400, &format!("{parent_kind} has no {} collection", child_kind.collection()));
        }
        let children = match body.and_then(Value::as_array) {
            Some(items) => items,
            None => return error(400, "Invalid input."),
        };

        let mut uris = Vec::with_capacity(children.len());
        for child in children {
            let Some(uri) = child.as_str() else {
                return error(400, "Invalid input.");
            };
            match state.kind_of(uri) {
                Some(kind) if kind == child_kind => uris.push(uri.to_string()),
                Some(_) => return error(400, &format!("{uri} is not a {child_kind}")),
                None => return error(404, &format!("{uri} not found")),
            }
        }
        for uri in uris {
            let pair = (parent.to_string(), uri);
            if !state.links.contains(&pair) {
                state.links.push(pair);
            }
        }
        ok(json!({}))
    }

    fn describe(&self, element: Option<&str>) -> ApiResponse {
        let state = self.state();
        let Some(element) = element else {
            let catalogs: Vec<Value> = state
                .entities
                .iter()
                .filter(|(_, e)| e.kind == EntityKind::Catalog)
                .map(|(uri, _)| {
                    let offered: Vec<Value> = state
                        .children(uri, EntityKind::Resource)
                        .into_iter()
                        .map(|r| json!({ "@id": r }))
                        .collect();
                    json!({ "@id": uri, "ids:offeredResource": offered })
                })
                .collect();
            return ok(json!({
                "@type": "ids:BaseConnector",
                "@id": self.base_url,
                "ids:resourceCatalog": catalogs,
            }));
        };

        let Some(entity) = state.entities.get(element) else {
            return error(404, &format!("{element} not found"));
        };
        if entity.kind != EntityKind::Resource {
            return ok(json!({
                "@type": format!("ids:{}", type_name(entity.kind)),
                "@id": element,
            }));
        }

        let offers: Vec<Value> = state
            .children(element, EntityKind::Contract)
            .into_iter()
            .map(|contract| {
                let permissions: Vec<Value> = state
                    .children(&contract, EntityKind::Rule)
                    .iter()
                    .filter_map(|rule| state.entities.get(rule))
                    .map(|rule| rule_policy(&rule.fields))
                    .collect();
                json!({
                    "@type": "ids:ContractOffer",
                    "@id": contract,
                    "ids:permission": permissions,
                })
            })
            .collect();
        let representations: Vec<Value> = state
            .children(element, EntityKind::Representation)
            .into_iter()
            .map(|r| {
                let instances: Vec<Value> = state
                    .children(&r, EntityKind::Artifact)
                    .into_iter()
                    .map(|a| json!({ "@type": "ids:Artifact", "@id": a }))
                    .collect();
                json!({ "@type": "ids:Representation", "@id": r, "ids:instance": instances })
            })
            .collect();

        ok(json!({
            "@type": "ids:Resource",
            "@id": element,
            "ids:contractOffer": offers,
            "ids:representation": representations,
        }))
    }

    fn contract(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state();
        let (Some(resource), Some(artifact)) = (
            request.query_param("resourceIds"),
            request.query_param("artifactIds"),
        ) else {
            return error(400, "resourceIds and artifactIds are required");
        };
        for uri in [resource, artifact] {
            if !state.entities.contains_key(uri) {
                return error(404, &format!("{uri} not found"));
            }
        }

        let policy = match request.body.as_ref().and_then(Value::as_array) {
            Some(rules) if !rules.is_empty() => rules[0].clone(),
            _ => return error(400, "no usage policy supplied"),
        };
        if policy.get("ids:target").and_then(Value::as_str) != Some(artifact) {
            return error(400, "policy target does not match the requested artifact");
        }

        let agreement = json!({
            "@type": "ids:ContractAgreement",
            "@id": format!("{}/api/agreements/{}", self.base_url, uuid::Uuid::new_v4()),
            "ids:permission": [policy],
        });
        state.agreements.push(agreement.clone());
        ok(agreement)
    }

    fn webhook(&self, body: Option<&Value>) -> ApiResponse {
        let Some(event) = body else {
            return error(400, "missing event");
        };
        if let Err(missing) = check_event(event) {
            return error(400, &format!("invalid registry event: {missing}"));
        }
        self.state().events.push(event.clone());
        ok(json!({}))
    }

    fn read(&self, path: &[&str]) -> ApiResponse {
        let state = self.state();
        match path {
            [collection, id] => {
                let uri = format!("{}/api/{collection}/{id}", self.base_url);
                match state.entities.get(&uri) {
                    Some(entity) => ok(entity.fields.clone()),
                    None => error(404, &format!("{uri} not found")),
                }
            }
            ["artifacts", id, "data"] => {
                let uri = format!("{}/api/artifacts/{id}", self.base_url);
                if let Some(data) = state.artifact_data.get(&uri) {
                    return ApiResponse {
                        status: 200,
                        location: None,
                        body: data.clone(),
                    };
                }
                match state.entities.get(&uri) {
                    Some(entity) => ApiResponse {
                        status: 200,
                        location: None,
                        body: entity
                            .fields
                            .get("value")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .as_bytes()
                            .to_vec(),
                    },
                    None => error(404, &format!("{uri} not found")),
                }
            }
            [collection, id, children] => {
                let uri = format!("{}/api/{collection}/{id}", self.base_url);
                let Some(kind) = EntityKind::from_collection(children) else {
                    return error(404, "unknown collection");
                };
                if !state.entities.contains_key(&uri) {
                    return error(404, &format!("{uri} not found"));
                }
                ok(json!(state.children(&uri, kind)))
            }
            _ => error(404, "no such route"),
        }
    }
}

impl Transport for MemoryConnector {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let Some(path) = request
            .url
            .strip_prefix(&self.base_url)
            .and_then(|p| p.strip_prefix("/api/"))
        else {
            return Ok(error(404, "unknown host"));
        };
        let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();

        let response = match (request.method, segments.as_slice()) {
            (Method::Post, ["ids", "description"]) => self.describe(request.query_param("elementId")),
            (Method::Post, ["ids", "contract"]) => self.contract(request),
            (Method::Post, ["webhook", "registry"]) => self.webhook(request.body.as_ref()),
            (Method::Post, [collection]) => match EntityKind::from_collection(collection) {
                Some(kind) => self.create(kind, request.body.as_ref()),
                None => error(404, "no such route"),
            },
            (Method::Post, [_, _, children]) => {
                let parent = request.url.rsplit_once('/').map(|(p, _)| p).unwrap_or_default();
                match (
                    RawHandle::parse(parent),
                    EntityKind::from_collection(children),
                ) {
                    (Ok(parent), Some(kind)) => self.link(parent.as_str(), kind, request.body.as_ref()),
                    _ => error(404, "no such route"),
                }
            }
            (Method::Get, segments) => self.read(segments),
            _ => error(404, "no such route"),
        };
        tracing::trace!(url = %request.url, status = response.status, "memory connector answered");
        Ok(response)
    }
}

fn ok(body: Value) -> ApiResponse {
    ApiResponse {
        status: 200,
        location: None,
        body: body.to_string().into_bytes(),
    }
}

fn error(status: u16, message: &str) -> ApiResponse {
    ApiResponse {
        status,
        location: None,
        body: json!({ "message": message }).to_string().into_bytes(),
    }
}

fn type_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Catalog => "ResourceCatalog",
        EntityKind::Resource => "Resource",
        EntityKind::Representation => "Representation",
        EntityKind::App => "App",
        EntityKind::Endpoint => "Endpoint",
        EntityKind::Artifact => "Artifact",
        EntityKind::Contract => "ContractOffer",
        EntityKind::Rule => "Rule",
    }
}

/// A rule's policy document, or its raw value if that is not JSON.
fn rule_policy(fields: &Value) -> Value {
    let value = fields.get("value").and_then(Value::as_str).unwrap_or_default();
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

/// Check the fields a registry event must carry; returns the first missing one.
fn check_event(event: &Value) -> std::result::Result<(), &'static str> {
    event
        .get("type")
        .and_then(Value::as_str)
        .ok_or("type")?;
    event.get("occur_at").and_then(Value::as_i64).ok_or("occur_at")?;
    let data = event
        .get("event_data")
        .filter(|d| d.is_object())
        .ok_or("event_data")?;
    data.get("resources")
        .and_then(Value::as_array)
        .ok_or("event_data.resources")?;
    let name = data
        .get("repository")
        .and_then(|r| r.get("name"))
        .and_then(Value::as_str)
        .ok_or("event_data.repository.name")?;
    uuid::Uuid::parse_str(name).map_err(|_| "event_data.repository.name (not a UUID)")?;
    Ok(())
}
