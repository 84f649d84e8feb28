//! Entity creation.
//!
//! Each call POSTs one payload to the kind's collection endpoint and returns
//! the handle the server assigned. There is no idempotency: creating the same
//! payload twice yields two entities.

use crate::client::ConnectorClient;
use crate::error::{ConnectorError, Result};
use crate::handle::{EntityKind, Handle, RawHandle};
use crate::payload::Description;

/// Create an entity from a typed payload.
pub fn create<D: Description>(client: &ConnectorClient, desc: &D) -> Result<Handle<D::Entity>> {
    let body = serde_json::to_value(desc)?;
    let raw = create_raw(client, <D::Entity as crate::handle::Entity>::KIND, body)?;
    raw.typed()
}

/// Create an entity of `kind` from arbitrary fields.
///
/// The fields are validated only by the server. The returned handle must
/// belong to `kind`'s collection.
pub fn create_raw(
    client: &ConnectorClient,
    kind: EntityKind,
    fields: serde_json::Value,
) -> Result<RawHandle> {
    let url = client.url(&kind.create_path());
    let handle = client.post_for_handle(&url, fields)?;
    if handle.kind() != kind {
        return Err(ConnectorError::ResponseFormat {
            url,
            detail: format!("expected a {kind} location, got {}", handle.as_str()),
        });
    }
    tracing::info!(%kind, handle = %handle, "created entity");
    Ok(handle)
}
