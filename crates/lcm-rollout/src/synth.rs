//! Object synthesis — placement rules, placement bindings, policies.
//!
//! Pure functions: given a group, a batch index, and (where relevant) a
//! policy template, build the object the controller should make sure exists.
//! Names are deterministic, so running synthesis twice for the same inputs
//! yields the same names and the controller's create-if-absent step turns the
//! second run into a no-op.

use lcm_state::{Group, LabelSelector, Labels, Object, ObjectKind, PolicyTemplate};
use serde_json::{Map, Value, json};

use crate::error::ReconcileResult;
use crate::template::{self, RemediationAction};

/// Ownership labels stamped on every synthesized object.
///
/// `app: <product>` plus `<product>/group-owner: <group>`. They are used to
/// list a group's objects for status, never for cascade deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    product: String,
}

impl Ownership {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn owner_key(&self) -> String {
        format!("{}/group-owner", self.product)
    }

    pub fn labels(&self, group: &str) -> Labels {
        let mut labels = Labels::new();
        labels.insert("app".to_string(), self.product.clone());
        labels.insert(self.owner_key(), group.to_string());
        labels
    }

    pub fn selector(&self, group: &str) -> LabelSelector {
        LabelSelector::from(self.labels(group))
    }
}

// ── Names ─────────────────────────────────────────────────────────

pub fn placement_rule_name(group: &str, batch: usize) -> String {
    format!("{group}-batch-{batch}-placement-rule")
}

pub fn placement_binding_name(group: &str, batch: usize, template: &str) -> String {
    format!("{group}-batch-{batch}-{template}-placement-binding")
}

pub fn policy_name(group: &str, batch: usize, template: &str) -> String {
    format!("{group}-batch-{batch}-{template}-policy")
}

/// Policy instantiated from a common template.
pub fn common_policy_name(common: &str, template: &str) -> String {
    format!("{common}-{template}-policy")
}

/// Policy instantiated from a site template.
pub fn site_policy_name(site: &str, template: &str) -> String {
    format!("{site}-{template}-policy")
}

// ── Builders ──────────────────────────────────────────────────────

/// Placement rule selecting `clusters`, the resolved cluster identifiers of
/// the batch's sites, in batch order.
pub fn placement_rule(
    group: &Group,
    batch: usize,
    clusters: &[String],
    ownership: &Ownership,
) -> Object {
    let clusters: Vec<Value> = clusters.iter().map(|c| json!({ "name": c })).collect();
    let body = into_map(json!({
        "spec": {
            "clusterConditions": [
                {"type": "ManagedClusterConditionAvailable", "status": "True"}
            ],
            "clusters": clusters,
        }
    }));
    owned(
        ObjectKind::PlacementRule,
        body,
        placement_rule_name(&group.metadata.name, batch),
        group,
        ownership,
    )
}

/// Binding from the batch's placement rule to the template's policy.
pub fn placement_binding(
    group: &Group,
    batch: usize,
    template: &PolicyTemplate,
    ownership: &Ownership,
) -> ReconcileResult<Object> {
    let template_name = template::template_name(template)?;
    let group_name = &group.metadata.name;
    let rule = ObjectKind::PlacementRule;
    let policy = ObjectKind::Policy;
    let body = into_map(json!({
        "placementRef": {
            "name": placement_rule_name(group_name, batch),
            "kind": rule.as_str(),
            "apiGroup": rule.api_group(),
        },
        "subjects": [{
            "name": policy_name(group_name, batch, &template_name),
            "kind": policy.as_str(),
            "apiGroup": policy.api_group(),
        }],
    }));
    Ok(owned(
        ObjectKind::PlacementBinding,
        body,
        placement_binding_name(group_name, batch, &template_name),
        group,
        ownership,
    ))
}

/// Policy instance for one batch, built from the template body.
///
/// Labels already on the template are kept. The remediation mode is always
/// `inform`, whatever the template says; escalation happens only in
/// remediation.
pub fn policy(
    group: &Group,
    batch: usize,
    template: &PolicyTemplate,
    ownership: &Ownership,
) -> ReconcileResult<Object> {
    let decoded = template::decode(template)?;
    let mut body = decoded.body;
    template::set_remediation_action(&mut body, RemediationAction::Inform)?;

    let mut obj = Object::new(ObjectKind::Policy, body);
    obj.set_name(policy_name(&group.metadata.name, batch, &decoded.name));
    obj.set_namespace(group.metadata.namespace.clone());
    obj.merge_labels(&ownership.labels(&group.metadata.name));
    strip_server_fields(&mut obj);
    Ok(obj)
}

fn owned(
    kind: ObjectKind,
    body: Map<String, Value>,
    name: String,
    group: &Group,
    ownership: &Ownership,
) -> Object {
    let mut obj = Object::new(kind, body);
    obj.set_name(name);
    obj.set_namespace(group.metadata.namespace.clone());
    obj.set_labels(&ownership.labels(&group.metadata.name));
    obj
}

/// Drop store-assigned metadata a template may have been copied with.
fn strip_server_fields(obj: &mut Object) {
    if let Some(Value::Object(metadata)) = obj.body_mut().get_mut("metadata") {
        metadata.remove("resourceVersion");
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
