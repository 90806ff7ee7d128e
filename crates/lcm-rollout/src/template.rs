//! Narrow accessors for policy template documents.
//!
//! Templates are caller-defined JSON. Only `metadata.name` and
//! `spec.remediationAction` are ever read or written here.

use std::fmt;

use lcm_state::{Object, PolicyTemplate};
use serde_json::{Map, Value};

use crate::error::{ReconcileError, ReconcileResult};

/// Remediation mode of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    /// Advisory: report compliance only.
    #[default]
    Inform,
    /// Actively apply the policy.
    Enforce,
}

impl RemediationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inform => "inform",
            Self::Enforce => "enforce",
        }
    }

    /// Interpret a group's `remediationAction`. Only the exact string
    /// `enforce` escalates; anything else, including empty, is `Inform`.
    pub fn from_spec(value: &str) -> Self {
        if value == "enforce" {
            Self::Enforce
        } else {
            Self::Inform
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template payload that passed structural checks.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTemplate {
    pub name: String,
    pub body: Map<String, Value>,
}

/// Check that the payload is a JSON object with a non-empty `metadata.name`
/// and a `spec` object. Synthesis, binding names and remediation all go
/// through here, so a template rejected once is skipped everywhere.
pub fn decode(template: &PolicyTemplate) -> ReconcileResult<DecodedTemplate> {
    let Value::Object(body) = &template.object_definition else {
        return Err(ReconcileError::Decode(
            "policy template is not a JSON object".into(),
        ));
    };
    let name = body
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ReconcileError::Decode("policy template has no metadata.name".into()))?;
    if !body.get("spec").is_some_and(Value::is_object) {
        return Err(ReconcileError::Decode(format!(
            "policy template {name} has no spec section"
        )));
    }
    Ok(DecodedTemplate {
        name: name.to_string(),
        body: body.clone(),
    })
}

/// The template's display name.
pub fn template_name(template: &PolicyTemplate) -> ReconcileResult<String> {
    decode(template).map(|t| t.name)
}

/// `spec.remediationAction` of a stored policy, if set.
pub fn remediation_action(policy: &Object) -> Option<&str> {
    policy
        .body()
        .get("spec")
        .and_then(|spec| spec.get("remediationAction"))
        .and_then(Value::as_str)
}

/// Set `spec.remediationAction`. The body must already carry a `spec` object.
pub fn set_remediation_action(
    body: &mut Map<String, Value>,
    action: RemediationAction,
) -> ReconcileResult<()> {
    let spec = body
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ReconcileError::Decode("policy has no spec section".into()))?;
    spec.insert(
        "remediationAction".into(),
        Value::String(action.as_str().into()),
    );
    Ok(())
}
