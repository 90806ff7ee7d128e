//! lcm-state — object model and repository for cluster-group-lcm.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the declarative records the rollout controller reads
//! (groups, sites, common policy sets) and the platform objects it writes
//! (placement rules, placement bindings, policies).
//!
//! # Architecture
//!
//! Every record is stored as its JSON body in a per-kind redb table keyed by
//! `{namespace}/{name}`. Records carry an integer `metadata.resourceVersion`
//! that the store bumps on every write; an update carrying a stale version is
//! rejected with [`StateError::Conflict`].
//!
//! The [`Repository`] trait is the narrow contract the controller consumes.
//! [`StateStore`] is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and
//! can be shared across async tasks.

pub mod error;
pub mod object;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use object::{LabelSelector, Labels, Object, ObjectKind, Record, table_key};
pub use repository::{Repository, RepositoryExt};
pub use store::StateStore;
pub use types::*;
