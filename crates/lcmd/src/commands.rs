//! One-shot subcommands: load records, inspect plans and statuses.

use std::path::Path;

use anyhow::Context;
use lcm_core::LcmConfig;
use lcm_rollout::{ReconcileOutcome, Reconciler};
use lcm_state::{Group, Object, RepositoryExt, StateStore};
use serde_json::Value;
use tracing::info;

/// Split `namespace/name`.
pub fn parse_group_ref(group: &str) -> anyhow::Result<(&str, &str)> {
    match group.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((ns, name))
        }
        _ => anyhow::bail!("expected <namespace>/<group>, got {group:?}"),
    }
}

/// Parse a file holding one object or a JSON array of objects.
pub fn load_objects(path: &Path) -> anyhow::Result<Vec<Object>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    let items = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            Object::from_value(item).with_context(|| format!("object #{i} in {}", path.display()))
        })
        .collect()
}

/// `lcmd apply -f <file>`
pub fn apply(store: &StateStore, path: &Path) -> anyhow::Result<usize> {
    let objects = load_objects(path)?;
    for object in &objects {
        let stored = store.apply(object)?;
        info!(
            kind = %stored.kind(),
            namespace = stored.namespace(),
            name = stored.name(),
            version = stored.resource_version(),
            "applied"
        );
    }
    Ok(objects.len())
}

/// `lcmd plan <ns>/<group>`
pub fn plan(store: StateStore, config: &LcmConfig, group: &str) -> anyhow::Result<String> {
    let (namespace, name) = parse_group_ref(group)?;
    let reconciler = Reconciler::new(store, &config.controller);
    let batches = reconciler.plan(namespace, name)?;
    Ok(serde_json::to_string_pretty(&batches)?)
}

/// `lcmd status <ns>/<group>`
pub fn status(store: &StateStore, group: &str) -> anyhow::Result<String> {
    let (namespace, name) = parse_group_ref(group)?;
    let group: Group = store.get_record(namespace, name)?;
    Ok(serde_json::to_string_pretty(&group.status)?)
}

/// `lcmd reconcile <ns>/<group>`
pub fn reconcile(store: StateStore, config: &LcmConfig, group: &str) -> anyhow::Result<String> {
    let (namespace, name) = parse_group_ref(group)?;
    let reconciler = Reconciler::new(store, &config.controller);
    match reconciler.reconcile(namespace, name)? {
        ReconcileOutcome::GroupMissing => Ok(format!("group {group} not found")),
        ReconcileOutcome::Reconciled(report) => Ok(format!(
            "group {group}: {} batches, {} created, {} enforced",
            report.plan.len(),
            report.created.len(),
            report.enforced.len()
        )),
    }
}
