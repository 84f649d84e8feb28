//! Artifact metadata and data retrieval.
//!
//! Downloaded data is written byte-for-byte to `{artifactId}.json` and
//! fingerprinted with SHA-256 so callers can compare copies.

use std::fmt::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::client::ConnectorClient;
use crate::error::{ConnectorError, Result};
use crate::handle::{Artifact, Handle};

/// SHA-256 fingerprint of downloaded artifact data, shown as `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataDigest {
    hex: String,
}

impl DataDigest {
    pub fn of(data: &[u8]) -> Self {
        let hex = Sha256::digest(data)
            .iter()
            .fold(String::with_capacity(64), |mut hex, byte| {
                let _ = write!(hex, "{byte:02x}");
                hex
            });
        DataDigest { hex }
    }

    /// Lowercase hex, without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        DataDigest::of(data) == *self
    }
}

impl fmt::Display for DataDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.hex)
    }
}

/// Result of writing artifact data to disk.
#[derive(Debug, Clone)]
pub struct ArtifactDownload {
    pub path: PathBuf,
    pub bytes: usize,
    pub digest: DataDigest,
}

/// Fetch artifact metadata (`GET {artifact}`).
pub fn fetch_artifact(
    client: &ConnectorClient,
    artifact: &Handle<Artifact>,
) -> Result<serde_json::Value> {
    let response = client.get(artifact.as_str())?;
    serde_json::from_slice(&response.body).map_err(|e| ConnectorError::ResponseFormat {
        url: artifact.as_str().to_string(),
        detail: format!("artifact metadata is not JSON: {e}"),
    })
}

/// File name under which data of `artifact` is stored.
pub fn data_file_name(artifact: &Handle<Artifact>) -> String {
    format!("{}.json", artifact.id())
}

/// Fetch artifact data (`GET {artifact}/data`) and write it into `dir`.
pub fn download_artifact_data(
    client: &ConnectorClient,
    artifact: &Handle<Artifact>,
    dir: &Path,
) -> Result<ArtifactDownload> {
    let url = format!("{}/data", artifact.as_str());
    let response = client.get(&url)?;

    let path = dir.join(data_file_name(artifact));
    std::fs::write(&path, &response.body).map_err(|source| ConnectorError::Write {
        path: path.clone(),
        source,
    })?;

    let digest = DataDigest::of(&response.body);
    tracing::info!(
        artifact = %artifact,
        path = %path.display(),
        bytes = response.body.len(),
        %digest,
        "stored artifact data"
    );
    Ok(ArtifactDownload {
        path,
        bytes: response.body.len(),
        digest,
    })
}
