//! Registry settings and qualified image references.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Where and as whom images are pushed.
///
/// Every field is optional so that a partially filled configuration can be
/// loaded; the `require_*` accessors fail with a configuration error naming
/// the absent field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Registry host, e.g. `registry.example.org`.
    #[serde(default)]
    pub address: Option<String>,
    /// Repository (project) name inside the registry.
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl RegistrySettings {
    pub fn require_address(&self) -> Result<&str> {
        require(self.address.as_deref(), "registry.address")
    }

    pub fn require_repository(&self) -> Result<&str> {
        require(self.repository.as_deref(), "registry.repository")
    }

    /// Username and password, both required.
    pub fn require_credentials(&self) -> Result<(&str, &str)> {
        Ok((
            require(self.username.as_deref(), "registry.username")?,
            require(self.password.as_deref(), "registry.password")?,
        ))
    }
}

/// Fails with a configuration error if `value` is absent or blank.
pub(crate) fn require<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RegistryError::missing(field)),
    }
}

/// A fully qualified image reference: `{registry}/{repo}/{resourceId}[:{version}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry: String,
    repository: String,
    resource_id: String,
    version: Option<String>,
}

impl ImageReference {
    /// Build a reference, rejecting absent or empty components.
    ///
    /// An empty `version` is treated as absent.
    pub fn new(
        registry: Option<&str>,
        repository: Option<&str>,
        resource_id: Option<&str>,
        version: Option<&str>,
    ) -> Result<Self> {
        Ok(ImageReference {
            registry: require(registry, "registry.address")?.to_string(),
            repository: require(repository, "registry.repository")?.to_string(),
            resource_id: require(resource_id, "resource id")?.to_string(),
            version: version
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }

    /// Reference for `resource_id` under the registry and repository of `settings`.
    pub fn for_resource(
        settings: &RegistrySettings,
        resource_id: &str,
        version: Option<&str>,
    ) -> Result<Self> {
        ImageReference::new(
            settings.address.as_deref(),
            settings.repository.as_deref(),
            Some(resource_id),
            version,
        )
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.repository, self.resource_id)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}
