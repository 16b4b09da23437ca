use super::{Document, ObjectId, RecordCursor, RecordStore, ReplaceOutcome};
use crate::{Error, Result};
use parking_lot::RwLock;
use portable_atomic::{AtomicUsize, Ordering};
use serde_json::Value;
use std::sync::Arc;

const ID_FIELD: &str = "_id";

/// An in-process [`RecordStore`] keeping documents in insertion order.
///
/// Cloning is cheap and every clone shares the same documents, so a test can
/// keep a handle on the store it injected into a service.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: RwLock<Vec<Document>>,
    open_cursors: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cursors opened by [`RecordStore::find_all`] and not yet
    /// released.
    pub fn open_cursors(&self) -> usize {
        self.inner.open_cursors.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `doc` as-is, bypassing any translation. Used to seed documents
    /// that do not follow the record layout.
    pub fn insert_document(&self, doc: Document) {
        self.inner.docs.write().push(doc);
    }

    fn position(docs: &[Document], id: ObjectId) -> Option<usize> {
        let id = Value::String(id.to_string());
        docs.iter().position(|doc| doc.get(ID_FIELD) == Some(&id))
    }
}

impl RecordStore for MemoryStore {
    type Cursor = MemoryCursor;

    async fn insert_one(&self, mut doc: Document) -> Result<ObjectId> {
        let Some(fields) = doc.as_object_mut() else {
            return Err(Error::internal("only JSON objects can be stored"));
        };
        let id = match fields.get(ID_FIELD) {
            Some(Value::String(id)) => ObjectId::parse(id)?,
            Some(other) => {
                return Err(Error::internal(format!("unsupported {ID_FIELD}: {other}")));
            }
            None => {
                let id = ObjectId::generate();
                fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                id
            }
        };
        self.insert_document(doc);
        Ok(id)
    }

    async fn find_one(&self, id: ObjectId) -> Result<Option<Document>> {
        let docs = self.inner.docs.read();
        Ok(Self::position(&docs, id).map(|idx| docs[idx].clone()))
    }

    async fn replace_one(&self, id: ObjectId, mut doc: Document) -> Result<ReplaceOutcome> {
        let Some(fields) = doc.as_object_mut() else {
            return Err(Error::internal("only JSON objects can be stored"));
        };
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let mut docs = self.inner.docs.write();
        let Some(idx) = Self::position(&docs, id) else {
            return Ok(ReplaceOutcome::default());
        };
        let modified = docs[idx] != doc;
        if modified {
            docs[idx] = doc;
        }
        Ok(ReplaceOutcome {
            matched: 1,
            modified: u64::from(modified),
        })
    }

    async fn delete_one(&self, id: ObjectId) -> Result<u64> {
        let mut docs = self.inner.docs.write();
        Ok(Self::position(&docs, id).map_or(0, |idx| {
            docs.remove(idx);
            1
        }))
    }

    async fn find_all(&self) -> Result<MemoryCursor> {
        self.inner.open_cursors.fetch_add(1, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        tracing::trace!("memory cursor opened ({} open)", self.open_cursors());
        Ok(MemoryCursor {
            inner: Arc::clone(&self.inner),
            position: 0,
            released: false,
        })
    }
}

/// Cursor over a [`MemoryStore`], reading one document per pull.
#[derive(Debug)]
pub struct MemoryCursor {
    inner: Arc<Inner>,
    position: usize,
    released: bool,
}

impl RecordCursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<Document>> {
        if self.released {
            return Err(Error::internal("cursor already released"));
        }
        let doc = self.inner.docs.read().get(self.position).cloned();
        if doc.is_some() {
            self.position += 1;
        }
        Ok(doc)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.open_cursors.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_find_returns_it() {
        let store = MemoryStore::new();
        let id = store.insert_one(json!({ "title": "a" })).await.unwrap();
        let doc = store.find_one(id).await.unwrap().unwrap();
        assert_eq!(doc, json!({ "_id": id.to_string(), "title": "a" }));
        assert_eq!(store.find_one(ObjectId::generate()).await, Ok(None));
    }

    #[tokio::test]
    async fn insert_rejects_non_objects() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert_one(json!([1, 2])).await,
            Err(Error::Internal { .. })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn replace_reports_matched_and_modified() {
        let store = MemoryStore::new();
        let id = store.insert_one(json!({ "title": "a" })).await.unwrap();

        let changed = store.replace_one(id, json!({ "title": "b" })).await.unwrap();
        assert_eq!(changed, ReplaceOutcome { matched: 1, modified: 1 });

        let same = store.replace_one(id, json!({ "title": "b" })).await.unwrap();
        assert_eq!(same, ReplaceOutcome { matched: 1, modified: 0 });

        let missing = store
            .replace_one(ObjectId::generate(), json!({ "title": "c" }))
            .await
            .unwrap();
        assert_eq!(missing, ReplaceOutcome::default());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_once() {
        let store = MemoryStore::new();
        let id = store.insert_one(json!({})).await.unwrap();
        assert_eq!(store.delete_one(id).await, Ok(1));
        assert_eq!(store.delete_one(id).await, Ok(0));
    }

    #[tokio::test]
    async fn cursor_pulls_in_insertion_order_and_tracks_release() {
        let store = MemoryStore::new();
        for title in ["a", "b", "c"] {
            store.insert_one(json!({ "title": title })).await.unwrap();
        }

        let mut cursor = store.find_all().await.unwrap();
        assert_eq!(store.open_cursors(), 1);

        let mut titles = Vec::new();
        while let Some(doc) = cursor.next().await.unwrap() {
            titles.push(doc["title"].as_str().unwrap().to_string());
        }
        assert_eq!(titles, ["a", "b", "c"]);

        cursor.release();
        cursor.release();
        assert_eq!(store.open_cursors(), 0);
        assert!(cursor.next().await.is_err());
    }
}
