use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::store::{DocumentStore, WriteOp};

/// A typed record stored in one collection.
pub trait Entity: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

pub fn find<T: Entity>(store: &dyn DocumentStore, id: &str) -> Result<Option<T>> {
    match store.get(T::COLLECTION, id)? {
        Some(doc) => Ok(Some(serde_json::from_value(doc.data)?)),
        None => Ok(None),
    }
}

pub fn load<T: Entity>(store: &dyn DocumentStore, id: &str) -> Result<T> {
    find(store, id)?.ok_or_else(|| LedgerError::not_found(T::COLLECTION, id))
}

pub fn save<T: Entity>(store: &dyn DocumentStore, entity: &T) -> Result<()> {
    store.set(T::COLLECTION, entity.id(), serde_json::to_value(entity)?)
}

pub fn all<T: Entity>(store: &dyn DocumentStore) -> Result<Vec<T>> {
    store
        .list(T::COLLECTION)?
        .into_iter()
        .map(|doc| -> Result<T> { Ok(serde_json::from_value(doc.data)?) })
        .collect()
}

/// Full-document write for use inside a batch.
pub fn set_op<T: Entity>(entity: &T) -> Result<WriteOp> {
    Ok(WriteOp::Set {
        collection: T::COLLECTION.to_string(),
        id: entity.id().to_string(),
        data: serde_json::to_value(entity)?,
    })
}

/// Short human-facing reference such as `S-3F9A12BC`.
pub fn short_number(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", id[..8].to_uppercase())
}
