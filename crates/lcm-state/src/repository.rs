//! The repository contract consumed by the controller.

use crate::error::{StateError, StateResult};
use crate::object::{LabelSelector, Object, ObjectKind, Record};

/// Get/list/create/update over declarative objects.
///
/// `create` fails with [`StateError::AlreadyExists`] if the name is taken.
/// `update` fails with [`StateError::Conflict`] unless the object carries the
/// stored `resourceVersion`, so a concurrent writer can never be silently
/// overwritten.
pub trait Repository {
    fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> StateResult<Object>;

    /// Objects of `kind` in `namespace` whose labels match `selector`,
    /// ordered by name.
    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StateResult<Vec<Object>>;

    fn create(&self, object: &Object) -> StateResult<Object>;

    fn update(&self, object: &Object) -> StateResult<Object>;
}

/// Convenience helpers available on every repository.
pub trait RepositoryExt: Repository {
    /// Like `get`, but a missing object is `Ok(None)`.
    fn find(&self, kind: ObjectKind, namespace: &str, name: &str) -> StateResult<Option<Object>> {
        match self.get(kind, namespace, name) {
            Ok(obj) => Ok(Some(obj)),
            Err(StateError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch and decode a typed record.
    fn get_record<R: Record>(&self, namespace: &str, name: &str) -> StateResult<R> {
        self.get(R::KIND, namespace, name)?.to_record()
    }

    /// Fetch and decode a typed record, `None` if missing.
    fn find_record<R: Record>(&self, namespace: &str, name: &str) -> StateResult<Option<R>> {
        self.find(R::KIND, namespace, name)?
            .map(|obj| obj.to_record())
            .transpose()
    }
}

impl<T: Repository + ?Sized> RepositoryExt for T {}

impl<T: Repository + ?Sized> Repository for &T {
    fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> StateResult<Object> {
        (**self).get(kind, namespace, name)
    }

    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StateResult<Vec<Object>> {
        (**self).list(kind, namespace, selector)
    }

    fn create(&self, object: &Object) -> StateResult<Object> {
        (**self).create(object)
    }

    fn update(&self, object: &Object) -> StateResult<Object> {
        (**self).update(object)
    }
}
