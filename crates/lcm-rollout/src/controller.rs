//! Reconciler — drives one reconciliation pass for a group.
//!
//! A pass loads the group, plans its batches, makes sure every batch's
//! placement rule and every template's policy and placement binding exist,
//! escalates policies when the group is in `enforce` mode, and records the
//! owned objects in the group's status. It keeps no state between passes;
//! every pass re-derives everything from the stored records.

use lcm_core::ControllerConfig;
use lcm_state::{Group, GroupStatus, Object, ObjectKind, Repository, RepositoryExt, Site};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::remediation;
use crate::status;
use crate::strategy::{Batch, plan_for};
use crate::synth::{self, Ownership};
use crate::template::RemediationAction;

/// Result of a pass that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The group no longer exists; nothing to do.
    GroupMissing,
    Reconciled(PassReport),
}

/// What a completed pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub plan: Vec<Batch>,
    /// Names of objects created by this pass.
    pub created: Vec<String>,
    /// Names of policies escalated to `enforce` by this pass.
    pub enforced: Vec<String>,
    pub status: GroupStatus,
    pub status_written: bool,
}

/// Reconciles groups against a repository.
pub struct Reconciler<R> {
    repo: R,
    common_name: String,
    ownership: Ownership,
}

impl<R: Repository> Reconciler<R> {
    pub fn new(repo: R, config: &ControllerConfig) -> Self {
        Self {
            repo,
            common_name: config.common_name.clone(),
            ownership: Ownership::new(config.product.clone()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    /// Compute a group's batch plan without touching anything.
    pub fn plan(&self, namespace: &str, name: &str) -> ReconcileResult<Vec<Batch>> {
        let group: Group = self.repo.get_record(namespace, name)?;
        Ok(plan_for(&group))
    }

    /// Run one pass for `namespace/name`.
    ///
    /// Fatal errors (missing site or policy, store failures, conflicts)
    /// abort the pass immediately. A malformed template only skips that
    /// template: the rest of the pass runs, then the first decode error is
    /// returned so the scheduler still sees the failure.
    pub fn reconcile(&self, namespace: &str, name: &str) -> ReconcileResult<ReconcileOutcome> {
        let Some(group_object) = self.repo.find(ObjectKind::Group, namespace, name)? else {
            debug!(namespace, group = name, "group not found, nothing to reconcile");
            return Ok(ReconcileOutcome::GroupMissing);
        };
        let group: Group = group_object.to_record()?;

        let plan = plan_for(&group);
        info!(
            namespace,
            group = name,
            plan = ?plan.iter().map(|b| &b.sites).collect::<Vec<_>>(),
            "upgrade plan"
        );

        let mut created = Vec::new();
        let mut decode_error: Option<ReconcileError> = None;

        for batch in &plan {
            self.ensure_placement_rule(&group, batch, &mut created)?;
            for template in &group.spec.group_policy_templates {
                match self.ensure_template_objects(&group, batch.index, template, &mut created) {
                    Ok(()) => {}
                    Err(e @ ReconcileError::Decode(_)) => {
                        warn!(
                            group = name,
                            batch = batch.index,
                            error = %e,
                            "skipping undecodable group policy template"
                        );
                        decode_error.get_or_insert(e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let enforced = match RemediationAction::from_spec(&group.spec.remediation_action) {
            RemediationAction::Enforce => {
                let report =
                    remediation::remediate(&self.repo, &group, &plan, &self.common_name)?;
                if let Some(e) = report.decode_error {
                    decode_error.get_or_insert(e);
                }
                report.enforced
            }
            RemediationAction::Inform => {
                debug!(group = name, "remediation action is inform, not escalating");
                Vec::new()
            }
        };

        let status = status::aggregate(&self.repo, &group, &self.ownership)?;
        let status_written = status::persist(&self.repo, &group_object, &status)?;

        if let Some(e) = decode_error {
            return Err(e);
        }

        Ok(ReconcileOutcome::Reconciled(PassReport {
            plan,
            created,
            enforced,
            status,
            status_written,
        }))
    }

    fn ensure_placement_rule(
        &self,
        group: &Group,
        batch: &Batch,
        created: &mut Vec<String>,
    ) -> ReconcileResult<()> {
        let clusters = self.resolve_clusters(group, batch)?;
        let rule = synth::placement_rule(group, batch.index, &clusters, &self.ownership);
        self.ensure(rule, created)
    }

    fn ensure_template_objects(
        &self,
        group: &Group,
        batch: usize,
        template: &lcm_state::PolicyTemplate,
        created: &mut Vec<String>,
    ) -> ReconcileResult<()> {
        let policy = synth::policy(group, batch, template, &self.ownership)?;
        let binding = synth::placement_binding(group, batch, template, &self.ownership)?;
        self.ensure(policy, created)?;
        self.ensure(binding, created)
    }

    /// Cluster identifiers of the batch's sites, in batch order.
    fn resolve_clusters(&self, group: &Group, batch: &Batch) -> ReconcileResult<Vec<String>> {
        batch
            .sites
            .iter()
            .map(|site| {
                let site: Site = self.repo.get_record(&group.metadata.namespace, site)?;
                Ok(site.spec.cluster)
            })
            .collect()
    }

    /// Create `object` unless an object of the same kind and name exists.
    /// Existing bodies are never touched.
    fn ensure(&self, object: Object, created: &mut Vec<String>) -> ReconcileResult<()> {
        let kind = object.kind();
        if self
            .repo
            .find(kind, object.namespace(), object.name())?
            .is_some()
        {
            debug!(%kind, name = object.name(), "object already exists");
            return Ok(());
        }
        match self.repo.create(&object) {
            Ok(stored) => {
                info!(%kind, name = stored.name(), "created object");
                created.push(stored.name().to_string());
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(%kind, name = object.name(), "object created concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
