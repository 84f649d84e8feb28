//! `idsprov.toml` parsing and connection setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use idsprov_connector::{ConnectorClient, ConnectorSettings, MemoryConnector, OfferTemplate};
use idsprov_registry::{ImageSettings, RegistrySettings};

/// File name searched for from the working directory upward.
pub const CONFIG_FILE: &str = "idsprov.toml";

/// The top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Connector endpoint and credentials (required).
    pub connector: ConnectorConfig,
    /// Which built-in example offer to provision when `[offer]` is absent.
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub image: ImageSettings,
    /// Offer payloads; fields left out fall back to the remote example offer.
    #[serde(default)]
    pub offer: Option<OfferTemplate>,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
}

/// Connector section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Scheme, host and optional port.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_tls: bool,
    /// Pause before every read request, in seconds.
    #[serde(default = "default_read_delay")]
    pub read_delay_secs: u64,
    /// Global request timeout, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_read_delay() -> u64 {
    5
}

/// Built-in example offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Remote,
    Local,
}

/// Negotiation section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// IDS data endpoint of the recipient; defaults to `{connector.url}/api/ids/data`.
    #[serde(default)]
    pub recipient: Option<String>,
    /// Ask the recipient to download the data right away.
    #[serde(default)]
    pub download: bool,
}

impl ProvisionConfig {
    /// Search upward from `start_dir` for an `idsprov.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                let config = ProvisionConfig::load(&candidate)?;
                return Ok(Some((config, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse a configuration from a TOML string.
    #[cfg(test)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing idsprov.toml")
    }

    /// Transport settings for the connector section.
    pub fn connector_settings(&self) -> ConnectorSettings {
        let c = &self.connector;
        let mut settings = ConnectorSettings::new(&c.url, &c.username, &c.password);
        settings.insecure_tls = c.insecure_tls;
        settings.timeout = c.timeout_secs.map(Duration::from_secs);
        settings.read_delay = Duration::from_secs(c.read_delay_secs);
        settings
    }

    /// A client for the configured connector.
    ///
    /// With `dry_run`, requests are answered by an in-memory connector that
    /// is also returned for inspection.
    pub fn client(&self, dry_run: bool) -> (ConnectorClient, Option<Arc<MemoryConnector>>) {
        let settings = self.connector_settings();
        if dry_run {
            tracing::info!(url = %settings.base_url, "dry run: using in-memory connector");
            let memory = Arc::new(MemoryConnector::new(&settings.base_url));
            let client = ConnectorClient::new(&settings.base_url, memory.clone());
            (client, Some(memory))
        } else {
            (ConnectorClient::connect(&settings), None)
        }
    }

    /// The offer to provision.
    pub fn offer_template(&self) -> OfferTemplate {
        match (&self.offer, self.profile) {
            (Some(offer), _) => offer.clone(),
            (None, Profile::Remote) => OfferTemplate::default(),
            (None, Profile::Local) => OfferTemplate::local(),
        }
    }

    /// Recipient for description and contract requests.
    pub fn recipient(&self) -> String {
        self.negotiation.recipient.clone().unwrap_or_else(|| {
            format!("{}/api/ids/data", self.connector.url.trim_end_matches('/'))
        })
    }

    /// Generate the template written by `idsprov init`.
    pub fn template(profile: Profile) -> String {
        match profile {
            Profile::Remote => r#"profile = "remote"

[connector]
url = "https://connector.example.org"
username = "admin"
password = "password"
insecure_tls = false
read_delay_secs = 5

[registry]
address = "registry.example.org"
repository = "ids-apps"
username = "robot"
password = "change-me"

[image]
name = "tutum/hello-world:latest"
version = "latest"

[negotiation]
download = false
"#
            .to_string(),
            Profile::Local => r#"profile = "local"

[connector]
url = "https://localhost:8080"
username = "admin"
password = "password"
insecure_tls = true
read_delay_secs = 5

[registry]
address = "localhost:5000"
repository = "ids-apps"
username = "admin"
password = "password"

[image]
name = "tutum/hello-world:latest"
version = "latest"

[negotiation]
recipient = "https://localhost:8080/api/ids/data"
download = false
"#
            .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = ProvisionConfig::from_str(
            r#"
[connector]
url = "https://c.example:8443/"
username = "admin"
password = "pw"
"#,
        )
        .unwrap();
        assert_eq!(config.profile, Profile::Remote);
        assert_eq!(config.connector.read_delay_secs, 5);
        assert!(!config.connector.insecure_tls);
        assert_eq!(config.recipient(), "https://c.example:8443/api/ids/data");
        assert_eq!(config.offer_template(), OfferTemplate::default());
        assert!(config.registry.address.is_none());

        let settings = config.connector_settings();
        assert_eq!(settings.base_url, "https://c.example:8443");
        assert_eq!(settings.read_delay, Duration::from_secs(5));
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn missing_connector_section_is_error() {
        assert!(ProvisionConfig::from_str("profile = \"local\"\n").is_err());
    }

    #[test]
    fn templates_parse() {
        let remote = ProvisionConfig::from_str(&ProvisionConfig::template(Profile::Remote)).unwrap();
        assert_eq!(remote.image.version.as_deref(), Some("latest"));
        assert_eq!(remote.registry.repository.as_deref(), Some("ids-apps"));

        let local = ProvisionConfig::from_str(&ProvisionConfig::template(Profile::Local)).unwrap();
        assert_eq!(local.profile, Profile::Local);
        assert!(local.connector.insecure_tls);
        assert_eq!(local.offer_template(), OfferTemplate::local());
    }

    #[test]
    fn partial_offer_falls_back_to_defaults() {
        let config = ProvisionConfig::from_str(
            r#"
[connector]
url = "https://c"
username = "a"
password = "b"
read_delay_secs = 0

[offer.artifact]
title = "Template"
value = "payload"

[[offer.endpoints]]
path = "/in"
port = 8080
type = "Input"
"#,
        )
        .unwrap();
        let offer = config.offer_template();
        assert_eq!(offer.artifact.value, "payload");
        assert_eq!(offer.endpoints.len(), 1);
        assert_eq!(offer.endpoints[0].port, Some(8080));
        assert_eq!(offer.rule, idsprov_connector::payload::RuleDesc::default());
        assert_eq!(config.connector_settings().read_delay, Duration::ZERO);
    }

    #[test]
    fn find_and_load_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            ProvisionConfig::template(Profile::Local),
        )
        .unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, found) = ProvisionConfig::find_and_load(&nested).unwrap().unwrap();
        assert_eq!(found, dir.path());
        assert_eq!(config.connector.url, "https://localhost:8080");
    }
}
