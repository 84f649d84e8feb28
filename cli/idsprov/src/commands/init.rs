//! `idsprov init`: configuration scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::{Profile, ProvisionConfig, CONFIG_FILE};

/// Write a configuration template into the working directory.
pub fn run(dir: &Path, local: bool) -> Result<()> {
    let profile = if local { Profile::Local } else { Profile::Remote };
    let path = write_config(dir, profile)?;
    println!("Created {}", path.display());
    println!("  edit [connector] and [registry] before running `idsprov provision`");
    Ok(())
}

pub(crate) fn write_config(dir: &Path, profile: Profile) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    fs::write(&path, ProvisionConfig::template(profile))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), false).unwrap();
        let config = ProvisionConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.profile, Profile::Remote);
    }

    #[test]
    fn init_local_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), Profile::Local).unwrap();
        let config = ProvisionConfig::load(&path).unwrap();
        assert_eq!(config.connector.url, "https://localhost:8080");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "keep me").unwrap();
        let err = run(dir.path(), true).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(),
            "keep me"
        );
    }
}
