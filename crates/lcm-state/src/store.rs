//! StateStore — redb-backed [`Repository`] implementation.
//!
//! Object bodies are JSON-serialized into redb's `&[u8]` value columns, one
//! table per kind. Each write transaction reads the stored resource version
//! before writing, which gives `update` compare-and-swap semantics. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::object::{LabelSelector, Object, ObjectKind, table_key};
use crate::repository::Repository;
use crate::tables::table_for;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for kind in ObjectKind::ALL {
            txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Create the object, or overwrite the body of an existing one.
    ///
    /// Used by tooling that loads records from files. The stored resource
    /// version keeps increasing across overwrites.
    pub fn apply(&self, object: &Object) -> StateResult<Object> {
        validate(object)?;
        let key = object.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let mut table = txn
                .open_table(table_for(object.kind()))
                .map_err(map_err!(Table))?;
            let current = table
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| decode_version(guard.value()))
                .transpose()?
                .flatten();

            let mut stored = object.clone();
            stored.set_resource_version(current.map_or(1, |v| v + 1));
            let value = encode(&stored)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = %object.kind(), %key, "object applied");
        Ok(stored)
    }

    /// Delete an object. Returns true if it existed.
    pub fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> StateResult<bool> {
        let key = table_key(namespace, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, %key, existed, "object deleted");
        Ok(existed)
    }

    /// Distinct namespaces that hold at least one object of `kind`.
    pub fn namespaces(&self, kind: ObjectKind) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        let mut namespaces: Vec<String> = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some((ns, _)) = key.value().split_once('/')
                && namespaces.last().map(String::as_str) != Some(ns)
            {
                namespaces.push(ns.to_string());
            }
        }
        Ok(namespaces)
    }
}

impl Repository for StateStore {
    fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> StateResult<Object> {
        let key = table_key(namespace, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => decode(kind, guard.value()),
            None => Err(StateError::NotFound(format!("{kind} {key}"))),
        }
    }

    fn list(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StateResult<Vec<Object>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let obj = decode(kind, value.value())?;
            if selector.matches(&obj.labels()) {
                results.push(obj);
            }
        }
        Ok(results)
    }

    fn create(&self, object: &Object) -> StateResult<Object> {
        validate(object)?;
        let key = object.table_key();
        let mut stored = object.clone();
        stored.set_resource_version(1);
        let value = encode(&stored)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let exists;
        {
            let mut table = txn
                .open_table(table_for(object.kind()))
                .map_err(map_err!(Table))?;
            exists = table.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if !exists {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        if exists {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(StateError::AlreadyExists(format!("{} {key}", object.kind())));
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = %object.kind(), %key, "object created");
        Ok(stored)
    }

    fn update(&self, object: &Object) -> StateResult<Object> {
        validate(object)?;
        let key = object.table_key();
        let expected = object.resource_version();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut table = txn
                .open_table(table_for(object.kind()))
                .map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode_version(guard.value())?),
                None => None,
            };
            match current {
                None => Err(StateError::NotFound(format!("{} {key}", object.kind()))),
                Some(current) if current != expected || expected.is_none() => {
                    Err(StateError::Conflict(format!(
                        "{} {key}: stored version {current:?}, update carries {expected:?}",
                        object.kind()
                    )))
                }
                Some(current) => {
                    let mut stored = object.clone();
                    stored.set_resource_version(current.unwrap_or_default() + 1);
                    let value = encode(&stored)?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    Ok(stored)
                }
            }
        };
        match outcome {
            Ok(stored) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(
                    kind = %object.kind(),
                    %key,
                    version = stored.resource_version(),
                    "object updated"
                );
                Ok(stored)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(e)
            }
        }
    }
}

fn validate(object: &Object) -> StateResult<()> {
    if object.name().is_empty() {
        return Err(StateError::Invalid(format!("{} has no name", object.kind())));
    }
    if object.namespace().is_empty() {
        return Err(StateError::Invalid(format!(
            "{} {} has no namespace",
            object.kind(),
            object.name()
        )));
    }
    // Keys are `{namespace}/{name}`; a slash would let one namespace's keys
    // sort under another's prefix.
    if object.namespace().contains('/') {
        return Err(StateError::Invalid(format!(
            "{} {}: namespace {:?} contains '/'",
            object.kind(),
            object.name(),
            object.namespace()
        )));
    }
    Ok(())
}

fn encode(object: &Object) -> StateResult<Vec<u8>> {
    serde_json::to_vec(object.body()).map_err(map_err!(Serialize))
}

fn decode(kind: ObjectKind, bytes: &[u8]) -> StateResult<Object> {
    let body: Map<String, Value> = serde_json::from_slice(bytes).map_err(map_err!(Deserialize))?;
    Ok(Object::new(kind, body))
}

fn decode_version(bytes: &[u8]) -> StateResult<Option<u64>> {
    let value: Value = serde_json::from_slice(bytes).map_err(map_err!(Deserialize))?;
    Ok(value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_u64))
}
