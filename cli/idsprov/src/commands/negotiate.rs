//! `idsprov negotiate`: provision an offer, then request its description
//! and a contract for its artifact.

use anyhow::{Context, Result};

use idsprov_connector::{
    describe, extract_policy, negotiate_contract, ConnectorClient, FailurePolicy, NegotiationResponse,
    OfferGraph, OfferTemplate, ProvisionPlan, Provisioner,
};

use crate::config::ProvisionConfig;

/// Handles and contract answer of a negotiation run.
#[derive(Debug)]
pub struct NegotiationOutcome {
    pub graph: OfferGraph,
    pub policy: serde_json::Value,
    pub response: NegotiationResponse,
}

pub fn run(config: &ProvisionConfig, dry_run: bool, recipient: Option<&str>) -> Result<()> {
    let (client, _memory) = config.client(dry_run);
    let recipient = recipient
        .map(str::to_string)
        .unwrap_or_else(|| config.recipient());
    let outcome = negotiate(&client, config, &recipient)?;

    println!("Contract response ({}):", outcome.response.status);
    match outcome.response.json() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", outcome.response.body),
    }
    Ok(())
}

pub(crate) fn negotiate(
    client: &ConnectorClient,
    config: &ProvisionConfig,
    recipient: &str,
) -> Result<NegotiationOutcome> {
    let template = config
        .offer
        .clone()
        .unwrap_or_else(OfferTemplate::negotiation);
    let (plan, slots) = ProvisionPlan::offer(&template)?;
    let report = Provisioner::new(client, FailurePolicy::FailFast)
        .run(&plan)
        .into_result()
        .context("provisioning offer")?;
    let graph = slots
        .resolve(&report)
        .context("provisioned offer is missing handles")?;
    println!("Resource: {}", graph.resource);
    println!("Artifact: {}", graph.artifact);

    let description = describe(client, Some(recipient), Some(graph.resource.as_str()))
        .with_context(|| format!("requesting description of {}", graph.resource))?;
    let policy = extract_policy(&description, &graph.artifact)?;
    tracing::debug!(policy = %policy, "extracted usage policy");

    let response = negotiate_contract(
        client,
        Some(recipient),
        &graph.resource,
        &graph.artifact,
        config.negotiation.download,
        &policy,
    )
    .context("requesting contract")?;

    Ok(NegotiationOutcome {
        graph,
        policy,
        response,
    })
}
