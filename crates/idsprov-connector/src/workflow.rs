//! Provisioning plans.
//!
//! A `ProvisionPlan` is an ordered list of create and link steps. Creating
//! an entity in a plan yields a typed [`Slot`], and links can only be
//! declared between slots, so a step can never read a handle that no
//! earlier step writes. `Provisioner::run` executes a plan front to back and
//! reports the outcome of every step.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::client::ConnectorClient;
use crate::error::{ConnectorError, Result};
use crate::factory;
use crate::handle::{
    App, Artifact, Catalog, Contract, Endpoint, Entity, EntityKind, Handle, RawHandle,
    Relation, Representation, Resource, Rule,
};
use crate::link;
use crate::payload::{Description, OfferTemplate};

static NEXT_PLAN_ID: AtomicUsize = AtomicUsize::new(0);

/// A plan-local reference to the handle a create step will produce.
pub struct Slot<E> {
    raw: RawSlot,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Slot<E> {
    pub fn raw(&self) -> RawSlot {
        self.raw
    }
}

impl<E> Clone for Slot<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Slot<E> {}

impl<E> std::fmt::Debug for Slot<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Slot({}#{})", self.raw.plan, self.raw.index)
    }
}

/// Untyped slot reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSlot {
    plan: usize,
    index: usize,
}

/// What a step does.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Create an entity and store its handle in `output`.
    Create {
        kind: EntityKind,
        fields: serde_json::Value,
        output: usize,
    },
    /// Add the handle in `child` to the collection of the handle in `parent`.
    Link { parent: usize, child: usize },
}

/// One step of a plan.
#[derive(Debug, Clone)]
pub struct Step {
    pub label: String,
    pub action: StepAction,
}

impl Step {
    /// Slots this step reads.
    pub fn reads(&self) -> Vec<usize> {
        match self.action {
            StepAction::Create { .. } => Vec::new(),
            StepAction::Link { parent, child } => vec![parent, child],
        }
    }

    /// Slot this step writes.
    pub fn writes(&self) -> Option<usize> {
        match self.action {
            StepAction::Create { output, .. } => Some(output),
            StepAction::Link { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct SlotInfo {
    label: String,
    kind: EntityKind,
}

/// An ordered list of provisioning steps.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    id: usize,
    slots: Vec<SlotInfo>,
    steps: Vec<Step>,
}

impl Default for ProvisionPlan {
    fn default() -> Self {
        ProvisionPlan::new()
    }
}

impl ProvisionPlan {
    pub fn new() -> Self {
        ProvisionPlan {
            id: NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Label of the entity held by `slot`.
    pub fn slot_label(&self, slot: RawSlot) -> Option<&str> {
        if slot.plan != self.id {
            return None;
        }
        self.slots.get(slot.index).map(|s| s.label.as_str())
    }

    /// Append a step creating an entity from a typed payload.
    pub fn create<D: Description>(&mut self, label: &str, desc: &D) -> Result<Slot<D::Entity>> {
        let fields = serde_json::to_value(desc)?;
        let raw = self.create_raw(label, <D::Entity as Entity>::KIND, fields);
        Ok(Slot {
            raw,
            _entity: PhantomData,
        })
    }

    /// Append a step creating an entity of `kind` from arbitrary fields.
    pub fn create_raw(&mut self, label: &str, kind: EntityKind, fields: serde_json::Value) -> RawSlot {
        let index = self.slots.len();
        self.slots.push(SlotInfo {
            label: label.to_string(),
            kind,
        });
        self.steps.push(Step {
            label: format!("create {label}"),
            action: StepAction::Create {
                kind,
                fields,
                output: index,
            },
        });
        RawSlot {
            plan: self.id,
            index,
        }
    }

    /// Append a step adding `child` to `parent`.
    pub fn link<P, C>(&mut self, parent: Slot<P>, child: Slot<C>) -> Result<()>
    where
        P: Relation<C>,
        C: Entity,
    {
        self.link_raw(parent.raw, child.raw)
    }

    /// Append a link step between untyped slots.
    ///
    /// Fails if either slot belongs to another plan or the relation is not
    /// one the connector accepts.
    pub fn link_raw(&mut self, parent: RawSlot, child: RawSlot) -> Result<()> {
        let lookup = |slot: RawSlot| -> Result<&SlotInfo> {
            if slot.plan != self.id {
                return Err(ConnectorError::InvalidPlan {
                    detail: "slot belongs to a different plan".to_string(),
                });
            }
            self.slots
                .get(slot.index)
                .ok_or_else(|| ConnectorError::InvalidPlan {
                    detail: format!("unknown slot #{}", slot.index),
                })
        };
        let parent_info = lookup(parent)?;
        let child_info = lookup(child)?;
        if !parent_info.kind.accepts(child_info.kind) {
            return Err(ConnectorError::InvalidPlan {
                detail: format!(
                    "a {} cannot be added to a {}",
                    child_info.kind, parent_info.kind
                ),
            });
        }

        let label = format!("link {} to {}", child_info.label, parent_info.label);
        self.steps.push(Step {
            label,
            action: StepAction::Link {
                parent: parent.index,
                child: child.index,
            },
        });
        Ok(())
    }

    /// The standard app offer: create every entity of `template`, then wire
    /// catalog → resource → representation → app/artifact, app → endpoints,
    /// resource → contract → rule.
    pub fn offer(template: &OfferTemplate) -> Result<(ProvisionPlan, OfferSlots)> {
        let mut plan = ProvisionPlan::new();

        let catalog = plan.create("catalog", &template.catalog)?;
        let resource = plan.create("resource", &template.resource)?;
        let representation = plan.create("representation", &template.representation)?;
        let app = plan.create("app", &template.app)?;
        let endpoints = template
            .endpoints
            .iter()
            .enumerate()
            .map(|(i, e)| plan.create(&format!("endpoint {}", i + 1), e))
            .collect::<Result<Vec<_>>>()?;
        let artifact = plan.create("artifact", &template.artifact)?;
        let contract = plan.create("contract", &template.contract_or_now()?)?;
        let rule = plan.create("rule", &template.rule)?;

        plan.link(catalog, resource)?;
        plan.link(resource, representation)?;
        plan.link(representation, app)?;
        for endpoint in &endpoints {
            plan.link(app, *endpoint)?;
        }
        plan.link(representation, artifact)?;
        plan.link(resource, contract)?;
        plan.link(contract, rule)?;

        let slots = OfferSlots {
            catalog,
            resource,
            representation,
            app,
            endpoints,
            artifact,
            contract,
            rule,
        };
        Ok((plan, slots))
    }
}

/// What to do after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Skip every remaining step.
    #[default]
    FailFast,
    /// Continue with every step whose inputs exist.
    KeepGoing,
}

/// Outcome of a single step.
#[derive(Debug)]
pub enum StepStatus {
    Done,
    Failed(ConnectorError),
    /// Not attempted, because of an earlier failure.
    Skipped,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub label: String,
    pub status: StepStatus,
}

/// Result of running a plan.
#[derive(Debug)]
pub struct ProvisionReport {
    plan: usize,
    handles: Vec<Option<RawHandle>>,
    outcomes: Vec<StepOutcome>,
}

impl ProvisionReport {
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    /// Whether every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, StepStatus::Done))
    }

    /// Failed steps with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ConnectorError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            StepStatus::Failed(e) => Some((o.label.as_str(), e)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Skipped))
            .count()
    }

    /// Consume the report, returning the first error if any step failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        let ProvisionReport { outcomes, .. } = self;
        for outcome in outcomes {
            if let StepStatus::Failed(e) = outcome.status {
                return Err(e);
            }
        }
        Err(ConnectorError::InvalidPlan {
            detail: "plan did not complete".to_string(),
        })
    }

    /// Handle produced for `slot`, if its create step succeeded.
    pub fn handle<E: Entity>(&self, slot: &Slot<E>) -> Option<Handle<E>> {
        self.raw_handle(slot.raw)?.clone().typed().ok()
    }

    pub fn raw_handle(&self, slot: RawSlot) -> Option<&RawHandle> {
        if slot.plan != self.plan {
            return None;
        }
        self.handles.get(slot.index)?.as_ref()
    }
}

/// Executes plans against one connector.
pub struct Provisioner<'a> {
    client: &'a ConnectorClient,
    policy: FailurePolicy,
}

impl<'a> Provisioner<'a> {
    pub fn new(client: &'a ConnectorClient, policy: FailurePolicy) -> Self {
        Provisioner { client, policy }
    }

    /// Run every step of `plan` in order.
    pub fn run(&self, plan: &ProvisionPlan) -> ProvisionReport {
        let mut handles: Vec<Option<RawHandle>> = vec![None; plan.slots.len()];
        let mut outcomes = Vec::with_capacity(plan.steps.len());
        let mut failed = false;

        for step in &plan.steps {
            let inputs_ready = step.reads().iter().all(|i| handles[*i].is_some());
            let skip = match self.policy {
                FailurePolicy::FailFast => failed,
                FailurePolicy::KeepGoing => !inputs_ready,
            };
            if skip {
                tracing::warn!(step = %step.label, "skipping step");
                outcomes.push(StepOutcome {
                    label: step.label.clone(),
                    status: StepStatus::Skipped,
                });
                continue;
            }

            let result = match &step.action {
                StepAction::Create {
                    kind,
                    fields,
                    output,
                } => factory::create_raw(self.client, *kind, fields.clone()).map(|h| {
                    handles[*output] = Some(h);
                }),
                StepAction::Link { parent, child } => match (&handles[*parent], &handles[*child]) {
                    (Some(p), Some(c)) => link::link_raw(self.client, p, c),
                    _ => Err(ConnectorError::InvalidPlan {
                        detail: format!("{}: inputs missing", step.label),
                    }),
                },
            };

            let status = match result {
                Ok(()) => StepStatus::Done,
                Err(e) => {
                    tracing::error!(step = %step.label, error = %e, "step failed");
                    failed = true;
                    StepStatus::Failed(e)
                }
            };
            outcomes.push(StepOutcome {
                label: step.label.clone(),
                status,
            });
        }

        ProvisionReport {
            plan: plan.id,
            handles,
            outcomes,
        }
    }
}

/// Slots of a standard offer plan.
#[derive(Debug, Clone)]
pub struct OfferSlots {
    pub catalog: Slot<Catalog>,
    pub resource: Slot<Resource>,
    pub representation: Slot<Representation>,
    pub app: Slot<App>,
    pub endpoints: Vec<Slot<Endpoint>>,
    pub artifact: Slot<Artifact>,
    pub contract: Slot<Contract>,
    pub rule: Slot<Rule>,
}

impl OfferSlots {
    /// Collect the handles of a run; `None` if any entity is missing.
    pub fn resolve(&self, report: &ProvisionReport) -> Option<OfferGraph> {
        Some(OfferGraph {
            catalog: report.handle(&self.catalog)?,
            resource: report.handle(&self.resource)?,
            representation: report.handle(&self.representation)?,
            app: report.handle(&self.app)?,
            endpoints: self
                .endpoints
                .iter()
                .map(|e| report.handle(e))
                .collect::<Option<Vec<_>>>()?,
            artifact: report.handle(&self.artifact)?,
            contract: report.handle(&self.contract)?,
            rule: report.handle(&self.rule)?,
        })
    }
}

/// Handles of a provisioned app offer.
#[derive(Debug, Clone)]
pub struct OfferGraph {
    pub catalog: Handle<Catalog>,
    pub resource: Handle<Resource>,
    pub representation: Handle<Representation>,
    pub app: Handle<App>,
    pub endpoints: Vec<Handle<Endpoint>>,
    pub artifact: Handle<Artifact>,
    pub contract: Handle<Contract>,
    pub rule: Handle<Rule>,
}
