//! `idsprov provision`: create and link an app offer, then optionally
//! publish its image, simulate the registry event and fetch the artifact.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use idsprov_connector::workflow::StepStatus;
use idsprov_connector::{
    download_artifact_data, fetch_artifact, ArtifactDownload, ConnectorClient, FailurePolicy,
    OfferGraph, ProvisionPlan, Provisioner,
};
use idsprov_registry::{ContainerEngine, PublishReport};

use crate::commands::image;
use crate::config::ProvisionConfig;

/// Flags of a provisioning run.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub dry_run: bool,
    pub keep_going: bool,
    pub publish_image: bool,
    pub simulate_event: bool,
    pub download: bool,
    /// Directory for downloaded artifact data.
    pub out_dir: PathBuf,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct ProvisionSummary {
    pub graph: Option<OfferGraph>,
    pub failed_steps: usize,
    pub publish: Option<PublishReport>,
    pub event_sent: bool,
    pub artifact: Option<serde_json::Value>,
    pub download: Option<ArtifactDownload>,
}

pub fn run(config: &ProvisionConfig, options: &ProvisionOptions) -> Result<()> {
    let (client, _memory) = config.client(options.dry_run);
    let engine = image::engine(options.dry_run);
    let summary = provision(&client, engine.as_ref(), config, options)?;
    if summary.failed_steps > 0 {
        bail!("{} provisioning step(s) failed", summary.failed_steps);
    }
    Ok(())
}

pub(crate) fn provision(
    client: &ConnectorClient,
    engine: &dyn ContainerEngine,
    config: &ProvisionConfig,
    options: &ProvisionOptions,
) -> Result<ProvisionSummary> {
    let template = config.offer_template();
    let (plan, slots) = ProvisionPlan::offer(&template)?;
    let policy = if options.keep_going {
        FailurePolicy::KeepGoing
    } else {
        FailurePolicy::FailFast
    };

    tracing::info!(
        connector = client.base_url(),
        steps = plan.steps().len(),
        ?policy,
        "provisioning offer"
    );
    let report = Provisioner::new(client, policy).run(&plan);
    for outcome in report.outcomes() {
        match &outcome.status {
            StepStatus::Done => println!("  ok       {}", outcome.label),
            StepStatus::Failed(e) => println!("  FAILED   {}: {e}", outcome.label),
            StepStatus::Skipped => println!("  skipped  {}", outcome.label),
        }
    }

    let mut summary = ProvisionSummary {
        failed_steps: report.failures().count(),
        ..ProvisionSummary::default()
    };
    let graph = slots.resolve(&report);
    if !options.keep_going {
        report.into_result().context("provisioning offer")?;
    } else if summary.failed_steps > 0 {
        tracing::warn!(failed = summary.failed_steps, "continuing after failed steps");
    }

    let Some(graph) = graph else {
        tracing::warn!("offer incomplete; skipping image, event and artifact steps");
        return Ok(summary);
    };

    println!("Resource: {}", graph.resource);
    println!("  resource id: {}", graph.resource.id());
    println!("Artifact: {}", graph.artifact);
    println!("  artifact id: {}", graph.artifact.id());

    let resource_id = graph.resource.id().to_string();
    if options.publish_image {
        let published =
            image::publish_with(engine, &config.registry, &config.image, &resource_id)?;
        image::print_publish(&published);
        summary.publish = Some(published);
    }

    if options.simulate_event {
        let digest = summary.publish.as_ref().and_then(|p| p.digest.as_deref());
        image::send_push_event(client, config, &resource_id, None, digest)?;
        println!("Registry event sent for resource {resource_id}");
        summary.event_sent = true;
    }

    if options.download {
        let metadata = fetch_artifact(client, &graph.artifact).context("fetching artifact")?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        let download = download_artifact_data(client, &graph.artifact, &options.out_dir)
            .context("downloading artifact data")?;
        println!(
            "Stored {} ({} bytes, {})",
            download.path.display(),
            download.bytes,
            download.digest
        );
        summary.artifact = Some(metadata);
        summary.download = Some(download);
    }

    summary.graph = Some(graph);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::image::DryRunEngine;
    use crate::config::Profile;
    use idsprov_connector::EntityKind;

    fn config() -> ProvisionConfig {
        let mut config =
            ProvisionConfig::from_str(&ProvisionConfig::template(Profile::Local)).unwrap();
        config.connector.read_delay_secs = 0;
        config
    }

    #[test]
    fn fail_fast_stops_on_server_error() {
        let config = config();
        let (client, memory) = config.client(true);
        let memory = memory.unwrap();
        memory.fail_creates(EntityKind::Contract);

        let options = ProvisionOptions {
            dry_run: true,
            simulate_event: true,
            ..ProvisionOptions::default()
        };
        let err = provision(&client, &DryRunEngine, &config, &options).unwrap_err();
        assert!(format!("{err:#}").contains("status 500"));
        assert!(memory.events().is_empty());
        assert_eq!(memory.count(EntityKind::Rule), 0);
    }

    #[test]
    fn keep_going_reports_failures_and_skips_follow_ups() {
        let config = config();
        let (client, memory) = config.client(true);
        let memory = memory.unwrap();
        memory.fail_creates(EntityKind::Contract);

        let options = ProvisionOptions {
            dry_run: true,
            keep_going: true,
            simulate_event: true,
            ..ProvisionOptions::default()
        };
        let summary = provision(&client, &DryRunEngine, &config, &options).unwrap();
        assert_eq!(summary.failed_steps, 1);
        assert!(summary.graph.is_none());
        assert!(!summary.event_sent);
        // The rule is still created; only links that need the contract are skipped.
        assert_eq!(memory.count(EntityKind::Rule), 1);
    }
}
