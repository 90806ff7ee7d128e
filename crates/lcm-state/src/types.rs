//! Typed records for the application-defined kinds.
//!
//! Groups, sites, and the namespace-wide common policy set are written by an
//! external actor; the controller reads them and only ever writes a group's
//! status. Field names follow the camelCase wire form of the records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::object::{Labels, ObjectKind, Record};

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<u64>,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }
}

/// An opaque policy document. The controller reads `metadata.name` and owns
/// `spec.remediationAction`; everything else is caller-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTemplate {
    pub object_definition: Value,
}

impl PolicyTemplate {
    pub fn new(object_definition: Value) -> Self {
        Self { object_definition }
    }
}

// ── Group ─────────────────────────────────────────────────────────

/// A namespaced rollout unit spanning several sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub metadata: ObjectMeta,
    pub spec: GroupSpec,
    #[serde(default)]
    pub status: GroupStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    /// Member sites, in rollout order.
    #[serde(default)]
    pub sites: Vec<String>,
    /// Sites rolled out first, one per batch, in this order.
    #[serde(default)]
    pub canaries: Vec<String>,
    #[serde(default)]
    pub upgrade_strategy: UpgradeStrategySpec,
    #[serde(default)]
    pub group_policy_templates: Vec<PolicyTemplate>,
    /// `inform` or `enforce`. Empty means `inform`.
    #[serde(default)]
    pub remediation_action: String,
}

/// `upgradeStrategy.type` as written by the user: `Rolling` or `Parallel`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradeStrategySpec {
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Observed state written back by the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    #[serde(default)]
    pub placement_rules: Vec<String>,
    #[serde(default)]
    pub placement_bindings: Vec<String>,
    #[serde(default)]
    pub policies: Vec<String>,
}

impl Record for Group {
    const KIND: ObjectKind = ObjectKind::Group;
}

// ── Site ──────────────────────────────────────────────────────────

/// One managed cluster and its site-specific policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub metadata: ObjectMeta,
    pub spec: SiteSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSpec {
    /// Managed cluster identifier.
    pub cluster: String,
    #[serde(default)]
    pub site_policy_templates: Vec<PolicyTemplate>,
}

impl Record for Site {
    const KIND: ObjectKind = ObjectKind::Site;
}

// ── Common ────────────────────────────────────────────────────────

/// Namespace-wide policies that apply to every site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Common {
    pub metadata: ObjectMeta,
    pub spec: CommonSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    #[serde(default)]
    pub common_policy_templates: Vec<PolicyTemplate>,
}

impl Record for Common {
    const KIND: ObjectKind = ObjectKind::Common;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use serde_json::json;

    #[test]
    fn group_parses_wire_form() {
        let obj = Object::from_value(json!({
            "apiVersion": "ran.openshift.io/v1alpha1",
            "kind": "Group",
            "metadata": {"name": "g1", "namespace": "ztp", "resourceVersion": 3},
            "spec": {
                "sites": ["a", "b"],
                "canaries": ["a"],
                "upgradeStrategy": {"type": "Parallel"},
                "remediationAction": "enforce",
                "groupPolicyTemplates": [
                    {"objectDefinition": {"metadata": {"name": "upgrade"}, "spec": {}}}
                ]
            }
        }))
        .unwrap();

        let group: Group = obj.to_record().unwrap();
        assert_eq!(group.metadata.name, "g1");
        assert_eq!(group.metadata.resource_version, Some(3));
        assert_eq!(group.spec.sites, vec!["a", "b"]);
        assert_eq!(group.spec.upgrade_strategy.kind, "Parallel");
        assert_eq!(group.spec.group_policy_templates.len(), 1);
        assert_eq!(group.status, GroupStatus::default());
    }

    #[test]
    fn record_kind_mismatch_is_rejected() {
        let site = Site {
            metadata: ObjectMeta::new("ns", "a"),
            spec: SiteSpec {
                cluster: "cluster-a".into(),
                site_policy_templates: vec![],
            },
        };
        let obj = Object::from_record(&site).unwrap();
        assert_eq!(obj.kind(), ObjectKind::Site);
        assert!(obj.to_record::<Group>().is_err());

        let back: Site = obj.to_record().unwrap();
        assert_eq!(back, site);
    }

    #[test]
    fn group_status_serializes_camel_case() {
        let status = GroupStatus {
            placement_rules: vec!["r".into()],
            placement_bindings: vec!["b".into()],
            policies: vec!["p".into()],
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({"placementRules": ["r"], "placementBindings": ["b"], "policies": ["p"]})
        );
    }
}
