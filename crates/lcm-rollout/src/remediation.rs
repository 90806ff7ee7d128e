//! Remediation — one-way escalation of policies from `inform` to `enforce`.
//!
//! For every site of every batch, in this order:
//!
//! 1. common policies (`{common}-{template}-policy`), if the namespace has a
//!    Common record,
//! 2. the site's own policies (`{site}-{template}-policy`),
//! 3. the group's policies for the site's batch
//!    (`{group}-batch-{n}-{template}-policy`).
//!
//! Remediation never creates objects. A policy that should exist but doesn't
//! aborts the pass with `NotFound`; the next pass retries from scratch.
//! Policies already at `enforce` are left alone, so a repeated pass writes
//! nothing.

use lcm_state::{Common, Group, ObjectKind, PolicyTemplate, Repository, RepositoryExt, Site};
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::strategy::Batch;
use crate::synth;
use crate::template::{self, RemediationAction};

/// Where a policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Common,
    Site,
    Group,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Site => "site",
            Self::Group => "group",
        }
    }
}

/// What a remediation run did.
#[derive(Debug, Default)]
pub struct RemediationReport {
    /// Policies flipped to `enforce` by this run, in visit order.
    pub enforced: Vec<String>,
    /// Policy visits that found `enforce` already set.
    pub unchanged: usize,
    /// First template that could not be decoded. Its policy was skipped.
    pub decode_error: Option<ReconcileError>,
}

impl RemediationReport {
    fn skip_template(&mut self, scope: Scope, owner: &str, err: ReconcileError) {
        warn!(scope = scope.as_str(), owner, error = %err, "skipping undecodable policy template");
        self.decode_error.get_or_insert(err);
    }
}

/// Escalate every policy reachable from `plan` to `enforce`.
///
/// Callers only invoke this for groups whose remediation action is
/// `enforce`; see [`RemediationAction::from_spec`].
pub fn remediate<R: Repository>(
    repo: &R,
    group: &Group,
    plan: &[Batch],
    common_name: &str,
) -> ReconcileResult<RemediationReport> {
    let namespace = group.metadata.namespace.as_str();
    let common: Option<Common> = repo.find_record(namespace, common_name)?;
    if common.is_none() {
        debug!(namespace, common = common_name, "no common policy set");
    }

    let mut report = RemediationReport::default();
    for batch in plan {
        for site in &batch.sites {
            if let Some(common) = &common {
                enforce_templates(
                    repo,
                    namespace,
                    Scope::Common,
                    common_name,
                    &common.spec.common_policy_templates,
                    |t| synth::common_policy_name(common_name, t),
                    &mut report,
                )?;
            }

            let site_record: Site = repo.get_record(namespace, site)?;
            enforce_templates(
                repo,
                namespace,
                Scope::Site,
                site,
                &site_record.spec.site_policy_templates,
                |t| synth::site_policy_name(site, t),
                &mut report,
            )?;

            enforce_templates(
                repo,
                namespace,
                Scope::Group,
                &group.metadata.name,
                &group.spec.group_policy_templates,
                |t| synth::policy_name(&group.metadata.name, batch.index, t),
                &mut report,
            )?;
        }
    }

    info!(
        group = %group.metadata.name,
        enforced = report.enforced.len(),
        unchanged = report.unchanged,
        "remediation pass finished"
    );
    Ok(report)
}

fn enforce_templates<R: Repository>(
    repo: &R,
    namespace: &str,
    scope: Scope,
    owner: &str,
    templates: &[PolicyTemplate],
    policy_name: impl Fn(&str) -> String,
    report: &mut RemediationReport,
) -> ReconcileResult<()> {
    for t in templates {
        let name = match template::template_name(t) {
            Ok(name) => name,
            Err(e) => {
                report.skip_template(scope, owner, e);
                continue;
            }
        };
        enforce(repo, namespace, scope, &policy_name(&name), report)?;
    }
    Ok(())
}

fn enforce<R: Repository>(
    repo: &R,
    namespace: &str,
    scope: Scope,
    name: &str,
    report: &mut RemediationReport,
) -> ReconcileResult<()> {
    let mut policy = repo.get(ObjectKind::Policy, namespace, name)?;
    if template::remediation_action(&policy) == Some(RemediationAction::Enforce.as_str()) {
        report.unchanged += 1;
        return Ok(());
    }

    template::set_remediation_action(policy.body_mut(), RemediationAction::Enforce)?;
    repo.update(&policy)?;
    info!(
        scope = scope.as_str(),
        policy = name,
        "set remediationAction to enforce"
    );
    report.enforced.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcm_state::*;
    use serde_json::json;

    use crate::strategy::plan_for;

    fn tpl(name: &str) -> PolicyTemplate {
        PolicyTemplate::new(json!({"metadata": {"name": name}, "spec": {}}))
    }

    fn seed_policy(store: &StateStore, ns: &str, name: &str) {
        let obj = Object::from_value(json!({
            "kind": "Policy",
            "metadata": {"name": name, "namespace": ns},
            "spec": {"remediationAction": "inform"}
        }))
        .unwrap();
        store.create(&obj).unwrap();
    }

    fn seed_site(store: &StateStore, ns: &str, name: &str, templates: Vec<PolicyTemplate>) {
        let site = Site {
            metadata: ObjectMeta::new(ns, name),
            spec: SiteSpec {
                cluster: format!("cluster-{name}"),
                site_policy_templates: templates,
            },
        };
        store.create(&Object::from_record(&site).unwrap()).unwrap();
    }

    fn group(sites: &[&str], strategy: &str, templates: Vec<PolicyTemplate>) -> Group {
        Group {
            metadata: ObjectMeta::new("ztp", "g1"),
            spec: GroupSpec {
                sites: sites.iter().map(|s| s.to_string()).collect(),
                canaries: vec![],
                upgrade_strategy: UpgradeStrategySpec {
                    kind: strategy.to_string(),
                },
                group_policy_templates: templates,
                remediation_action: "enforce".into(),
            },
            status: GroupStatus::default(),
        }
    }

    fn action(store: &StateStore, name: &str) -> String {
        let p = store.get(ObjectKind::Policy, "ztp", name).unwrap();
        template::remediation_action(&p).unwrap_or_default().to_string()
    }

    #[test]
    fn enforces_common_site_and_group_policies() {
        let store = StateStore::open_in_memory().unwrap();
        let common = Common {
            metadata: ObjectMeta::new("ztp", "common"),
            spec: CommonSpec {
                common_policy_templates: vec![tpl("ntp")],
            },
        };
        store.create(&Object::from_record(&common).unwrap()).unwrap();
        seed_site(&store, "ztp", "a", vec![tpl("sriov")]);
        seed_site(&store, "ztp", "b", vec![]);
        seed_policy(&store, "ztp", "common-ntp-policy");
        seed_policy(&store, "ztp", "a-sriov-policy");
        seed_policy(&store, "ztp", "g1-batch-1-upgrade-policy");
        seed_policy(&store, "ztp", "g1-batch-2-upgrade-policy");

        let g = group(&["a", "b"], "Rolling", vec![tpl("upgrade")]);
        let report = remediate(&store, &g, &plan_for(&g), "common").unwrap();

        // Common first, then site, then group, for site a; then b.
        assert_eq!(
            report.enforced,
            vec![
                "common-ntp-policy",
                "a-sriov-policy",
                "g1-batch-1-upgrade-policy",
                "g1-batch-2-upgrade-policy",
            ]
        );
        // Common policy visited again for site b.
        assert_eq!(report.unchanged, 1);
        for name in [
            "common-ntp-policy",
            "a-sriov-policy",
            "g1-batch-1-upgrade-policy",
            "g1-batch-2-upgrade-policy",
        ] {
            assert_eq!(action(&store, name), "enforce");
        }
    }

    #[test]
    fn uses_each_sites_own_batch_index() {
        let store = StateStore::open_in_memory().unwrap();
        for site in ["a", "b", "c"] {
            seed_site(&store, "ztp", site, vec![]);
        }
        seed_policy(&store, "ztp", "g1-batch-1-upgrade-policy");
        seed_policy(&store, "ztp", "g1-batch-2-upgrade-policy");
        seed_policy(&store, "ztp", "g1-batch-3-upgrade-policy");

        let g = group(&["a", "b", "c"], "Rolling", vec![tpl("upgrade")]);
        remediate(&store, &g, &plan_for(&g), "common").unwrap();

        assert_eq!(action(&store, "g1-batch-3-upgrade-policy"), "enforce");
    }

    #[test]
    fn second_run_writes_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        seed_site(&store, "ztp", "a", vec![]);
        seed_policy(&store, "ztp", "g1-batch-1-upgrade-policy");

        let g = group(&["a"], "Rolling", vec![tpl("upgrade")]);
        let first = remediate(&store, &g, &plan_for(&g), "common").unwrap();
        assert_eq!(first.enforced.len(), 1);
        let version = store
            .get(ObjectKind::Policy, "ztp", "g1-batch-1-upgrade-policy")
            .unwrap()
            .resource_version();

        let second = remediate(&store, &g, &plan_for(&g), "common").unwrap();
        assert!(second.enforced.is_empty());
        assert_eq!(second.unchanged, 1);
        let after = store
            .get(ObjectKind::Policy, "ztp", "g1-batch-1-upgrade-policy")
            .unwrap()
            .resource_version();
        assert_eq!(version, after);
    }

    #[test]
    fn missing_policy_aborts() {
        let store = StateStore::open_in_memory().unwrap();
        seed_site(&store, "ztp", "a", vec![tpl("sriov")]);

        let g = group(&["a"], "Rolling", vec![]);
        let err = remediate(&store, &g, &plan_for(&g), "common").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn missing_site_aborts() {
        let store = StateStore::open_in_memory().unwrap();
        let g = group(&["ghost"], "Rolling", vec![]);
        let err = remediate(&store, &g, &plan_for(&g), "common").unwrap_err();
        assert!(err.is_not_found());
    }

    /// Bumps the stored version of every object just before the update
    /// lands, as a concurrent writer would.
    struct RacingRepo {
        inner: StateStore,
    }

    impl Repository for RacingRepo {
        fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> StateResult<Object> {
            self.inner.get(kind, namespace, name)
        }

        fn list(
            &self,
            kind: ObjectKind,
            namespace: &str,
            selector: &LabelSelector,
        ) -> StateResult<Vec<Object>> {
            self.inner.list(kind, namespace, selector)
        }

        fn create(&self, object: &Object) -> StateResult<Object> {
            self.inner.create(object)
        }

        fn update(&self, object: &Object) -> StateResult<Object> {
            let current = self
                .inner
                .get(object.kind(), object.namespace(), object.name())?;
            self.inner.apply(&current)?;
            self.inner.update(object)
        }
    }

    #[test]
    fn conflicting_flip_propagates_and_leaves_inform() {
        let store = StateStore::open_in_memory().unwrap();
        seed_site(&store, "ztp", "a", vec![]);
        seed_policy(&store, "ztp", "g1-batch-1-upgrade-policy");

        let repo = RacingRepo {
            inner: store.clone(),
        };
        let g = group(&["a"], "Rolling", vec![tpl("upgrade")]);
        let err = remediate(&repo, &g, &plan_for(&g), "common").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(action(&store, "g1-batch-1-upgrade-policy"), "inform");
    }

    #[test]
    fn template_without_spec_is_skipped() {
        let store = StateStore::open_in_memory().unwrap();
        seed_site(&store, "ztp", "a", vec![]);
        seed_policy(&store, "ztp", "g1-batch-1-good-policy");

        let broken = PolicyTemplate::new(json!({"metadata": {"name": "broken"}}));
        let g = group(&["a"], "Rolling", vec![tpl("good"), broken]);
        let report = remediate(&store, &g, &plan_for(&g), "common").unwrap();
        assert_eq!(report.enforced, vec!["g1-batch-1-good-policy"]);
        assert!(report.decode_error.unwrap().is_decode());
    }

    #[test]
    fn undecodable_template_is_skipped_and_reported() {
        let store = StateStore::open_in_memory().unwrap();
        seed_site(&store, "ztp", "a", vec![PolicyTemplate::new(json!(7))]);
        seed_policy(&store, "ztp", "g1-batch-1-upgrade-policy");

        let g = group(&["a"], "Rolling", vec![tpl("upgrade")]);
        let report = remediate(&store, &g, &plan_for(&g), "common").unwrap();
        assert_eq!(report.enforced, vec!["g1-batch-1-upgrade-policy"]);
        assert!(report.decode_error.unwrap().is_decode());
    }
}
