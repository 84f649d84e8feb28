//! `idsprov artifact`: show artifact metadata and optionally store its data.

use std::path::Path;

use anyhow::{Context, Result};

use idsprov_connector::{download_artifact_data, fetch_artifact, Artifact, Handle};

use crate::config::ProvisionConfig;

pub fn run(config: &ProvisionConfig, handle: &str, data: bool, out_dir: &Path) -> Result<()> {
    let artifact = Handle::<Artifact>::parse(handle)?;
    let (client, _memory) = config.client(false);

    let metadata = fetch_artifact(&client, &artifact)
        .with_context(|| format!("fetching {artifact}"))?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    if data {
        let download = download_artifact_data(&client, &artifact, out_dir)
            .with_context(|| format!("downloading data of {artifact}"))?;
        println!(
            "Stored {} ({} bytes, {})",
            download.path.display(),
            download.bytes,
            download.digest
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    #[test]
    fn rejects_non_artifact_handle() {
        let config = ProvisionConfig::from_str(&ProvisionConfig::template(Profile::Local)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            &config,
            "https://localhost:8080/api/contracts/1",
            false,
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected artifact handle"));
    }
}
