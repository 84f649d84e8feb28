//! Linking created entities.
//!
//! A link adds the child handle to the parent's collection named after the
//! child's kind: `POST {parent}/{child collection}` with body `[child]`.
//! Links are directional; the inverse association is a separate call.

use crate::client::ConnectorClient;
use crate::error::{ConnectorError, Result};
use crate::handle::{Entity, Handle, RawHandle, Relation};

/// Add `child` to `parent`'s collection.
pub fn link<P, C>(client: &ConnectorClient, parent: &Handle<P>, child: &Handle<C>) -> Result<()>
where
    P: Relation<C>,
    C: Entity,
{
    link_raw(client, parent.raw(), child.raw())
}

/// Add `child` to `parent`'s collection, checking the relation at runtime.
///
/// A 404 from the server means one of the handles no longer exists and is
/// reported as [`ConnectorError::StaleHandle`].
pub fn link_raw(client: &ConnectorClient, parent: &RawHandle, child: &RawHandle) -> Result<()> {
    let url = parent.relation_url(child.kind());
    if !parent.kind().accepts(child.kind()) {
        return Err(ConnectorError::InvalidHandle {
            uri: child.as_str().to_string(),
            detail: format!("a {} cannot be added to a {}", child.kind(), parent.kind()),
        });
    }

    tracing::info!(
        parent = %parent,
        child = %child,
        "adding {} to {}",
        child.kind(),
        parent.kind()
    );
    let body = serde_json::json!([child.as_str()]);
    match client.post_json(&url, body) {
        Ok(_) => Ok(()),
        Err(ConnectorError::Request {
            status: 404,
            message,
            ..
        }) => Err(ConnectorError::StaleHandle { url, message }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::create;
    use crate::handle::EntityKind;
    use crate::memory::MemoryConnector;
    use crate::payload::{CatalogDesc, ContractDesc, ResourceDesc, RuleDesc};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryConnector>, ConnectorClient) {
        let memory = Arc::new(MemoryConnector::new("https://connector.test"));
        let client = ConnectorClient::new("https://connector.test", memory.clone());
        (memory, client)
    }

    #[test]
    fn link_resource_into_catalog() {
        let (memory, client) = setup();
        let catalog = create(&client, &CatalogDesc::default()).unwrap();
        let resource = create(&client, &ResourceDesc::default()).unwrap();
        link(&client, &catalog, &resource).unwrap();

        assert_eq!(
            memory.children(catalog.as_str(), EntityKind::Resource),
            vec![resource.as_str().to_string()]
        );
        // Directional: the resource's catalog collection stays empty.
        assert!(memory
            .children(resource.as_str(), EntityKind::Catalog)
            .is_empty());
    }

    #[test]
    fn inverse_link_is_separate_call() {
        let (memory, client) = setup();
        let catalog = create(&client, &CatalogDesc::default()).unwrap();
        let resource = create(&client, &ResourceDesc::default()).unwrap();
        link(&client, &resource, &catalog).unwrap();
        assert_eq!(memory.children(resource.as_str(), EntityKind::Catalog).len(), 1);
        assert!(memory.children(catalog.as_str(), EntityKind::Resource).is_empty());
    }

    #[test]
    fn stale_parent_is_rejected() {
        let (_memory, client) = setup();
        let rule = create(&client, &RuleDesc::default()).unwrap();
        let ghost = Handle::<crate::handle::Contract>::parse(
            "https://connector.test/api/contracts/00000000-0000-0000-0000-000000000000",
        )
        .unwrap();
        let err = link(&client, &ghost, &rule).unwrap_err();
        assert!(matches!(err, ConnectorError::StaleHandle { .. }));
    }

    #[test]
    fn stale_child_is_rejected() {
        let (memory, client) = setup();
        let contract = create(&client, &ContractDesc::from_now().unwrap()).unwrap();
        let ghost = Handle::<crate::handle::Rule>::parse("https://connector.test/api/rules/nope")
            .unwrap();
        let err = link(&client, &contract, &ghost).unwrap_err();
        assert!(err.is_not_found());
        assert!(memory.children(contract.as_str(), EntityKind::Rule).is_empty());
    }

    #[test]
    fn raw_link_checks_relation_catalogue() {
        let (_memory, client) = setup();
        let rule = create(&client, &RuleDesc::default()).unwrap();
        let resource = create(&client, &ResourceDesc::default()).unwrap();
        let err = link_raw(&client, rule.raw(), resource.raw()).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidHandle { .. }));
    }
}
