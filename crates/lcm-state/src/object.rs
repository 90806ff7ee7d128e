//! Generic declarative objects.
//!
//! An [`Object`] is a JSON document with a known [`ObjectKind`]. The
//! controller only ever touches a handful of well-known paths
//! (`metadata.name`, `metadata.namespace`, `metadata.labels`,
//! `metadata.resourceVersion`); everything else in the body is opaque and
//! round-trips untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{StateError, StateResult};

/// Label map. Ordered so that serialized bodies are stable.
pub type Labels = BTreeMap<String, String>;

// ── Kinds ─────────────────────────────────────────────────────────

/// Every object kind this workspace reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Group,
    Site,
    Common,
    PlacementRule,
    PlacementBinding,
    Policy,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 6] = [
        ObjectKind::Group,
        ObjectKind::Site,
        ObjectKind::Common,
        ObjectKind::PlacementRule,
        ObjectKind::PlacementBinding,
        ObjectKind::Policy,
    ];

    /// API group the kind belongs to.
    pub const fn api_group(self) -> &'static str {
        match self {
            Self::Group | Self::Site | Self::Common => "ran.openshift.io",
            Self::PlacementRule => "apps.open-cluster-management.io",
            Self::PlacementBinding | Self::Policy => "policy.open-cluster-management.io",
        }
    }

    /// API version within the group.
    pub const fn version(self) -> &'static str {
        match self {
            Self::Group | Self::Site | Self::Common => "v1alpha1",
            Self::PlacementRule | Self::PlacementBinding | Self::Policy => "v1",
        }
    }

    /// The `kind` string written into object bodies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Group => "Group",
            Self::Site => "Site",
            Self::Common => "Common",
            Self::PlacementRule => "PlacementRule",
            Self::PlacementBinding => "PlacementBinding",
            Self::Policy => "Policy",
        }
    }

    /// `{group}/{version}`, as written into `apiVersion`.
    pub fn api_version(self) -> String {
        format!("{}/{}", self.api_group(), self.version())
    }

    /// Resolve a `kind` string. Unknown kinds yield `None`.
    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Label selector ────────────────────────────────────────────────

/// Equality-based label selector. An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    required: Labels,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key=value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// True if `labels` carries every required pair.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.required
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
    }
}

impl From<Labels> for LabelSelector {
    fn from(required: Labels) -> Self {
        Self { required }
    }
}

// ── Object ────────────────────────────────────────────────────────

/// A typed record that maps onto one [`ObjectKind`].
pub trait Record: Serialize + DeserializeOwned {
    const KIND: ObjectKind;
}

/// A JSON object body tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    kind: ObjectKind,
    body: Map<String, Value>,
}

impl Object {
    /// Wrap a body, stamping `apiVersion` and `kind` from `kind`.
    pub fn new(kind: ObjectKind, mut body: Map<String, Value>) -> Self {
        body.insert("apiVersion".into(), Value::String(kind.api_version()));
        body.insert("kind".into(), Value::String(kind.as_str().into()));
        Self { kind, body }
    }

    /// Parse a document whose `kind` field names a known kind.
    pub fn from_value(value: Value) -> StateResult<Self> {
        let Value::Object(body) = value else {
            return Err(StateError::Invalid("object body is not a JSON object".into()));
        };
        let kind = body
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| StateError::Invalid("object has no kind".into()))?;
        let kind = ObjectKind::from_kind(kind)
            .ok_or_else(|| StateError::Invalid(format!("unknown kind: {kind}")))?;
        Ok(Self::new(kind, body))
    }

    /// Serialize a typed record into an object of its kind.
    pub fn from_record<R: Record>(record: &R) -> StateResult<Self> {
        match serde_json::to_value(record) {
            Ok(Value::Object(body)) => Ok(Self::new(R::KIND, body)),
            Ok(_) => Err(StateError::Serialize(format!(
                "{} did not serialize to an object",
                R::KIND
            ))),
            Err(e) => Err(StateError::Serialize(e.to_string())),
        }
    }

    /// Deserialize this object as a typed record.
    pub fn to_record<R: Record>(&self) -> StateResult<R> {
        if self.kind != R::KIND {
            return Err(StateError::Deserialize(format!(
                "expected {}, found {}",
                R::KIND,
                self.kind
            )));
        }
        serde_json::from_value(Value::Object(self.body.clone()))
            .map_err(|e| StateError::Deserialize(e.to_string()))
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.body
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.body.get("metadata").and_then(Value::as_object)
    }

    /// `metadata`, created if absent or not an object.
    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .body
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just set to an object"),
        }
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.metadata()
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata_mut()
            .insert("name".into(), Value::String(name.into()));
    }

    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.metadata_mut()
            .insert("namespace".into(), Value::String(namespace.into()));
    }

    /// Labels with string values. Non-string values are ignored.
    pub fn labels(&self) -> Labels {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_labels(&mut self, labels: &Labels) {
        let map = labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.metadata_mut().insert("labels".into(), Value::Object(map));
    }

    /// Insert `labels` into `metadata.labels`, overwriting only those keys.
    /// Existing entries, string or not, are kept.
    pub fn merge_labels(&mut self, labels: &Labels) {
        let metadata = self.metadata_mut();
        let slot = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(existing) = slot {
            for (k, v) in labels {
                existing.insert(k.clone(), Value::String(v.clone()));
            }
        }
    }

    pub fn resource_version(&self) -> Option<u64> {
        self.metadata()
            .and_then(|m| m.get("resourceVersion"))
            .and_then(Value::as_u64)
    }

    pub fn set_resource_version(&mut self, version: u64) {
        self.metadata_mut()
            .insert("resourceVersion".into(), Value::from(version));
    }

    /// Composite table key, `{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        table_key(self.namespace(), self.name())
    }
}

/// Build the composite key used by every object table.
pub fn table_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Object {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Object::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_table_is_consistent() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_kind(kind.as_str()), Some(kind));
        }
        assert_eq!(
            ObjectKind::PlacementRule.api_version(),
            "apps.open-cluster-management.io/v1"
        );
        assert_eq!(
            ObjectKind::Policy.api_version(),
            "policy.open-cluster-management.io/v1"
        );
        assert_eq!(ObjectKind::from_kind("Deployment"), None);
    }

    #[test]
    fn from_value_requires_known_kind() {
        assert!(Object::from_value(json!([1, 2])).is_err());
        assert!(Object::from_value(json!({"metadata": {}})).is_err());
        assert!(Object::from_value(json!({"kind": "Pod"})).is_err());

        let obj = Object::from_value(json!({
            "kind": "Policy",
            "metadata": {"name": "p", "namespace": "ns"}
        }))
        .unwrap();
        assert_eq!(obj.kind(), ObjectKind::Policy);
        assert_eq!(obj.table_key(), "ns/p");
        assert_eq!(
            obj.body()["apiVersion"],
            json!("policy.open-cluster-management.io/v1")
        );
    }

    #[test]
    fn metadata_accessors_create_missing_sections() {
        let mut obj = Object::new(ObjectKind::Policy, Map::new());
        assert_eq!(obj.name(), "");
        assert!(obj.labels().is_empty());
        assert_eq!(obj.resource_version(), None);

        obj.set_name("p1");
        obj.set_namespace("ns");
        let mut labels = Labels::new();
        labels.insert("app".into(), "x".into());
        obj.set_labels(&labels);
        obj.set_resource_version(7);

        assert_eq!(obj.name(), "p1");
        assert_eq!(obj.namespace(), "ns");
        assert_eq!(obj.labels(), labels);
        assert_eq!(obj.resource_version(), Some(7));
    }

    #[test]
    fn merge_labels_keeps_existing_entries() {
        let mut obj = Object::from_value(json!({
            "kind": "Policy",
            "metadata": {"name": "p", "labels": {"weight": 3, "app": "old"}}
        }))
        .unwrap();
        let mut labels = Labels::new();
        labels.insert("app".into(), "lcm".into());
        obj.merge_labels(&labels);

        assert_eq!(obj.body()["metadata"]["labels"], json!({"weight": 3, "app": "lcm"}));

        let mut bare = Object::new(ObjectKind::Policy, Map::new());
        bare.merge_labels(&labels);
        assert_eq!(bare.labels(), labels);
    }

    #[test]
    fn selector_matching() {
        let mut labels = Labels::new();
        labels.insert("app".into(), "lcm".into());
        labels.insert("owner".into(), "g1".into());

        assert!(LabelSelector::new().matches(&labels));
        assert!(LabelSelector::new().with("app", "lcm").matches(&labels));
        assert!(
            LabelSelector::new()
                .with("app", "lcm")
                .with("owner", "g1")
                .matches(&labels)
        );
        assert!(!LabelSelector::new().with("owner", "g2").matches(&labels));
        assert!(!LabelSelector::new().with("tier", "x").matches(&labels));
    }
}
