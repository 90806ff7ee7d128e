//! lcm-rollout — batch planning, policy synthesis and remediation for cluster groups.
//!
//! This crate turns a `Group` record into a staged, policy-driven upgrade.
//! Each reconciliation pass plans the group's batches (canaries first, then
//! one batch per site or one parallel batch), materializes a placement rule
//! per batch plus a policy and placement binding per group policy template,
//! escalates policies from `inform` to `enforce` when the group asks for it,
//! and writes the names of everything it owns back into the group's status.
//!
//! # Components
//!
//! `strategy` holds the upgrade strategy and the batch planner. `template`
//! reads and writes the few fields of a policy template the controller cares
//! about. `synth` builds placement rules, placement bindings and policies
//! with deterministic names. `remediation` escalates policies to `enforce`,
//! and `status` records a group's owned objects. `controller` ties them
//! together into one reconciliation pass.

pub mod controller;
pub mod error;
pub mod remediation;
pub mod status;
pub mod strategy;
pub mod synth;
pub mod template;

pub use controller::{PassReport, ReconcileOutcome, Reconciler};
pub use error::{ReconcileError, ReconcileResult};
pub use remediation::RemediationReport;
pub use strategy::{Batch, UpgradeStrategy, plan, plan_for};
pub use synth::Ownership;
pub use template::RemediationAction;
