//! Document store abstraction.
//!
//! Records live in named collections as JSON objects keyed by a string id.
//! Two backends implement [`DocumentStore`]: [`MemoryStore`] for tests and
//! throwaway sessions, [`SqliteStore`] for the on-disk ledger.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde_json::{Map, Value};

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Look up a dotted field path such as `customer.name`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    Update {
        collection: String,
        id: String,
        patch: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn delete(collection: &str, id: &str) -> Self {
        WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn update(collection: &str, id: &str, patch: Value) -> Self {
        WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        }
    }
}

pub trait DocumentStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert or replace a document.
    fn set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Merge the top-level keys of `patch` into an existing document.
    fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// All documents of a collection, ordered by id.
    fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Apply every write or none of them.
    fn commit(&self, ops: Vec<WriteOp>) -> Result<()>;

    fn add(&self, collection: &str, data: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.set(collection, &id, data)?;
        Ok(id)
    }
}

pub(crate) fn require_object(data: &Value) -> Result<&Map<String, Value>> {
    data.as_object()
        .ok_or_else(|| LedgerError::invalid("document data must be a JSON object"))
}

/// Shallow merge used by both backends for `update`.
pub(crate) fn merge(target: &mut Value, patch: &Value) -> Result<()> {
    let patch = require_object(patch)?;
    let target = target
        .as_object_mut()
        .ok_or_else(|| LedgerError::Store("stored document is not an object".to_string()))?;
    for (k, v) in patch {
        target.insert(k.clone(), v.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Behaviour every backend must share.
    fn exercise_store(store: &dyn DocumentStore) {
        store.set("products", "p1", json!({"name": "Case", "qty": 3})).unwrap();
        let doc = store.get("products", "p1").unwrap().unwrap();
        assert_eq!(doc.data["name"], "Case");

        store.update("products", "p1", json!({"qty": 5})).unwrap();
        let doc = store.get("products", "p1").unwrap().unwrap();
        assert_eq!(doc.data["qty"], 5);
        assert_eq!(doc.data["name"], "Case");

        let err = store.update("products", "missing", json!({"qty": 1})).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        let id = store.add("products", json!({"name": "Charger"})).unwrap();
        assert_eq!(store.list("products").unwrap().len(), 2);
        assert!(store.delete("products", &id).unwrap());
        assert!(!store.delete("products", &id).unwrap());

        assert!(store.set("products", "bad", json!([1, 2])).is_err());
    }

    fn exercise_commit(store: &dyn DocumentStore) {
        store.set("sales", "s1", json!({"paid": 0})).unwrap();

        // Batch with a failing update leaves everything untouched.
        let result = store.commit(vec![
            WriteOp::update("sales", "s1", json!({"paid": 10})),
            WriteOp::update("sales", "nope", json!({"paid": 10})),
        ]);
        assert!(result.is_err());
        assert_eq!(store.get("sales", "s1").unwrap().unwrap().data["paid"], 0);

        store
            .commit(vec![
                WriteOp::update("sales", "s1", json!({"paid": 10})),
                WriteOp::Set {
                    collection: "payments".into(),
                    id: "pay1".into(),
                    data: json!({"amount": 10}),
                },
            ])
            .unwrap();
        assert_eq!(store.get("sales", "s1").unwrap().unwrap().data["paid"], 10);
        assert!(store.get("payments", "pay1").unwrap().is_some());

        store.commit(vec![WriteOp::delete("payments", "pay1")]).unwrap();
        assert!(store.get("payments", "pay1").unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        exercise_store(&MemoryStore::new());
        exercise_commit(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("a.db")).unwrap();
        exercise_store(&store);
        let store = SqliteStore::open(&dir.path().join("b.db")).unwrap();
        exercise_commit(&store);
    }

    #[test]
    fn test_field_path() {
        let doc = Document {
            id: "x".into(),
            data: json!({"customer": {"name": "Ana"}}),
        };
        assert_eq!(doc.field("customer.name"), Some(&json!("Ana")));
        assert_eq!(doc.field("customer.phone"), None);
    }
}
