//! redb table definitions for the object store.
//!
//! One table per object kind. Every table uses `&str` keys of the form
//! `{namespace}/{name}` and `&[u8]` values holding the JSON body.

use redb::TableDefinition;

use crate::object::ObjectKind;

/// Group records.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Site records.
pub const SITES: TableDefinition<&str, &[u8]> = TableDefinition::new("sites");

/// Common policy sets (one per namespace).
pub const COMMONS: TableDefinition<&str, &[u8]> = TableDefinition::new("commons");

/// Placement rules selecting a batch's clusters.
pub const PLACEMENT_RULES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("placement_rules");

/// Placement bindings tying a placement rule to a policy.
pub const PLACEMENT_BINDINGS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("placement_bindings");

/// Policy instances.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// The table holding objects of `kind`.
pub const fn table_for(kind: ObjectKind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match kind {
        ObjectKind::Group => GROUPS,
        ObjectKind::Site => SITES,
        ObjectKind::Common => COMMONS,
        ObjectKind::PlacementRule => PLACEMENT_RULES,
        ObjectKind::PlacementBinding => PLACEMENT_BINDINGS,
        ObjectKind::Policy => POLICIES,
    }
}
