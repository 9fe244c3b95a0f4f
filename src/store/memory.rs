use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::{merge, require_object, Document, DocumentStore, WriteOp};
use crate::error::{LedgerError, Result};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// In-process store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Store("memory store lock poisoned".to_string()))
    }
}

fn apply(collections: &mut Collections, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::Set {
            collection,
            id,
            data,
        } => {
            require_object(&data)?;
            collections.entry(collection).or_default().insert(id, data);
        }
        WriteOp::Update {
            collection,
            id,
            patch,
        } => {
            let doc = collections
                .get_mut(&collection)
                .and_then(|c| c.get_mut(&id))
                .ok_or_else(|| LedgerError::not_found(&collection, &id))?;
            merge(doc, &patch)?;
        }
        WriteOp::Delete { collection, id } => {
            if let Some(c) = collections.get_mut(&collection) {
                c.remove(&id);
            }
        }
    }
    Ok(())
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.lock()?;
        Ok(guard.get(collection).and_then(|c| c.get(id)).map(|data| Document {
            id: id.to_string(),
            data: data.clone(),
        }))
    }

    fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let mut guard = self.lock()?;
        apply(
            &mut guard,
            WriteOp::Set {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            },
        )
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let mut guard = self.lock()?;
        apply(&mut guard, WriteOp::update(collection, id, patch))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut guard = self.lock()?;
        Ok(guard
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let guard = self.lock()?;
        Ok(guard
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut guard = self.lock()?;
        // Stage on a copy so a failing op leaves the store untouched.
        let mut staged = guard.clone();
        for op in ops {
            apply(&mut staged, op)?;
        }
        *guard = staged;
        Ok(())
    }
}
