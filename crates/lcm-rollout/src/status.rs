//! Status aggregation — record the names of a group's owned objects.

use lcm_state::{Group, GroupStatus, Object, ObjectKind, Repository};
use tracing::{debug, info};

use crate::error::{ReconcileError, ReconcileResult};
use crate::synth::Ownership;

/// List every placement rule, placement binding and policy labeled as owned
/// by `group`, in name order.
pub fn aggregate<R: Repository>(
    repo: &R,
    group: &Group,
    ownership: &Ownership,
) -> ReconcileResult<GroupStatus> {
    let selector = ownership.selector(&group.metadata.name);
    let namespace = &group.metadata.namespace;
    let names = |kind: ObjectKind| -> ReconcileResult<Vec<String>> {
        Ok(repo
            .list(kind, namespace, &selector)?
            .iter()
            .map(|o| o.name().to_string())
            .collect())
    };

    Ok(GroupStatus {
        placement_rules: names(ObjectKind::PlacementRule)?,
        placement_bindings: names(ObjectKind::PlacementBinding)?,
        policies: names(ObjectKind::Policy)?,
    })
}

/// Write `status` onto the group object as it was read at the start of the
/// pass. The update is version-checked, so a group changed in the meantime
/// yields `Conflict`. Returns false when the stored status already matches.
pub fn persist<R: Repository>(
    repo: &R,
    group_object: &Object,
    status: &GroupStatus,
) -> ReconcileResult<bool> {
    let current = group_object
        .body()
        .get("status")
        .cloned()
        .map(serde_json::from_value::<GroupStatus>)
        .transpose()
        .map_err(|e| ReconcileError::Decode(format!("group status: {e}")))?
        .unwrap_or_default();
    if &current == status {
        debug!(group = group_object.name(), "group status unchanged");
        return Ok(false);
    }

    let mut updated = group_object.clone();
    let value = serde_json::to_value(status)
        .map_err(|e| ReconcileError::Decode(format!("group status: {e}")))?;
    updated.body_mut().insert("status".into(), value);
    repo.update(&updated)?;
    info!(
        group = group_object.name(),
        placement_rules = ?status.placement_rules,
        placement_bindings = ?status.placement_bindings,
        policies = ?status.policies,
        "updated group status"
    );
    Ok(true)
}
