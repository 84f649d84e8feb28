//! `idsprov publish-image` and `idsprov simulate-event`.

use anyhow::{Context, Result};

use idsprov_connector::ConnectorClient;
use idsprov_registry::webhook::send_event;
use idsprov_registry::{
    publish_image, ContainerEngine, DockerCli, ImageReference, PublishReport, RegistryEvent,
    RegistrySettings,
};

use crate::config::ProvisionConfig;

/// Engine that logs commands instead of running them.
pub(crate) struct DryRunEngine;

impl ContainerEngine for DryRunEngine {
    fn login(&self, registry: &str, username: &str, _password: &str) -> idsprov_registry::Result<()> {
        tracing::info!(registry, username, "dry run: docker login");
        Ok(())
    }

    fn pull(&self, image: &str) -> idsprov_registry::Result<()> {
        tracing::info!(image, "dry run: docker pull");
        Ok(())
    }

    fn tag(&self, source: &str, target: &str) -> idsprov_registry::Result<()> {
        tracing::info!(source, target, "dry run: docker tag");
        Ok(())
    }

    fn push(&self, reference: &str) -> idsprov_registry::Result<Option<String>> {
        tracing::info!(reference, "dry run: docker push");
        Ok(None)
    }

    fn list_images(&self) -> idsprov_registry::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// The engine for a run.
pub(crate) fn engine(dry_run: bool) -> Box<dyn ContainerEngine> {
    if dry_run {
        Box::new(DryRunEngine)
    } else {
        Box::new(DockerCli::default())
    }
}

/// Publish the configured image for `resource_id`.
pub fn publish(
    config: &ProvisionConfig,
    resource_id: &str,
    version: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let mut image = config.image.clone();
    if let Some(version) = version {
        image.version = Some(version.to_string());
    }
    let engine = engine(dry_run);
    let report = publish_with(engine.as_ref(), &config.registry, &image, resource_id)?;
    print_publish(&report);
    Ok(())
}

pub(crate) fn publish_with(
    engine: &dyn ContainerEngine,
    registry: &RegistrySettings,
    image: &idsprov_registry::ImageSettings,
    resource_id: &str,
) -> Result<PublishReport> {
    publish_image(engine, registry, image, resource_id)
        .with_context(|| format!("publishing image for resource {resource_id}"))
}

pub(crate) fn print_publish(report: &PublishReport) {
    println!("Pushed {}", report.reference);
    if let Some(digest) = &report.digest {
        println!("  digest: {digest}");
    }
}

/// Post a simulated push event for `resource_id`.
pub fn simulate_event(
    config: &ProvisionConfig,
    resource_id: &str,
    tag: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let (client, _memory) = config.client(dry_run);
    let body = send_push_event(&client, config, resource_id, tag, None)?;
    println!("Registry event sent for resource {resource_id}");
    if !body.is_empty() {
        println!("  response: {body}");
    }
    Ok(())
}

/// Build and post a push event; returns the listener's response body.
pub(crate) fn send_push_event(
    client: &ConnectorClient,
    config: &ProvisionConfig,
    resource_id: &str,
    tag: Option<&str>,
    digest: Option<&str>,
) -> Result<String> {
    let reference = ImageReference::for_resource(
        &config.registry,
        resource_id,
        config.image.version.as_deref(),
    )?;
    let tag = tag
        .or(config.image.version.as_deref())
        .unwrap_or("latest");
    let event = RegistryEvent::push_artifact(&reference, tag, digest);
    send_event(client, &event).context("sending registry event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn config() -> ProvisionConfig {
        let mut config =
            ProvisionConfig::from_str(&ProvisionConfig::template(Profile::Local)).unwrap();
        config.connector.read_delay_secs = 0;
        config
    }

    #[test]
    fn dry_run_publish_reports_reference() {
        let config = config();
        let report = publish_with(
            &DryRunEngine,
            &config.registry,
            &config.image,
            "97fa143c-b19e-4b95-9ae9-9ec68ea880ad",
        )
        .unwrap();
        assert_eq!(
            report.reference.to_string(),
            "localhost:5000/ids-apps/97fa143c-b19e-4b95-9ae9-9ec68ea880ad:latest"
        );
        assert_eq!(report.digest, None);
    }

    #[test]
    fn publish_without_registry_is_configuration_error() {
        let mut config = config();
        config.registry.address = None;
        let err = publish(&config, "res", None, true).unwrap_err();
        assert!(format!("{err:#}").contains("registry.address"));
    }

    #[test]
    fn event_reaches_dry_run_connector() {
        let config = config();
        let (client, memory) = config.client(true);
        send_push_event(
            &client,
            &config,
            "97fa143c-b19e-4b95-9ae9-9ec68ea880ad",
            Some("1"),
            None,
        )
        .unwrap();
        let events = memory.unwrap().events();
        assert_eq!(events[0]["event_data"]["resources"][0]["tag"], "1");
    }
}
