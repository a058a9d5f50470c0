use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::store::{
    matches, DeleteResult, Document, DocumentStore, Filter, ObjectId, StoreError, UpdateResult,
    ID_FIELD,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CollectionData {
    documents: Vec<Document>,
    #[serde(default)]
    unique_indexes: Vec<Vec<String>>,
}

impl CollectionData {
    /// Rejects `candidate` if it collides with another document on any unique index.
    /// `skip` is the position of the document being replaced, if any.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &Document,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        for fields in &self.unique_indexes {
            let key: Vec<Option<&Value>> = fields.iter().map(|f| candidate.get(f)).collect();
            let collides = self
                .documents
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, doc)| {
                    fields
                        .iter()
                        .zip(&key)
                        .all(|(field, value)| doc.get(field) == *value)
                });
            if collides {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key: describe_key(fields, &key),
                });
            }
        }
        Ok(())
    }
}

fn describe_key(fields: &[String], values: &[Option<&Value>]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .zip(values)
        .map(|(f, v)| match v {
            Some(v) => format!("{}: {}", f, v),
            None => format!("{}: null", f),
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collections: HashMap<String, CollectionData>,
}

/// In-process document store.
///
/// Volatile by default. When opened on a path, the whole database is loaded
/// at open time and rewritten atomically after every mutation.
pub struct MemoryStore {
    name: String,
    state: RwLock<Snapshot>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(Snapshot::default()),
            snapshot_path: None,
        }
    }

    /// Opens a file-backed store, creating an empty database if `path` does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            "Opened document snapshot {} ({} collections)",
            path.display(),
            snapshot.collections.len()
        );
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        Ok(Self {
            name,
            state: RwLock::new(snapshot),
            snapshot_path: Some(path),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes the snapshot while the caller still holds the write guard,
    /// so snapshots land in mutation order.
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(snapshot)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        debug!("Persisted snapshot for {}", self.name);
        Ok(())
    }

    /// Persists `state`, reverting the in-memory change with `undo` when the
    /// write fails so readers never see data the snapshot lacks.
    async fn commit<F>(&self, state: &mut Snapshot, undo: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot) + Send,
    {
        if let Err(e) = self.persist(state).await {
            undo(state);
            return Err(e);
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .filter(|d| matches(d, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.documents.iter().find(|d| matches(d, filter)).cloned()))
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        document.insert(ID_FIELD.to_string(), id.into());

        let mut state = self.state.write().await;
        let data = state.collections.entry(collection.to_string()).or_default();
        data.check_unique(collection, &document, None)?;
        data.documents.push(document);
        self.commit(&mut state, |s| {
            if let Some(data) = s.collections.get_mut(collection) {
                data.documents.pop();
            }
        })
        .await?;
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: Document,
    ) -> Result<UpdateResult, StoreError> {
        let mut state = self.state.write().await;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let Some(position) = data.documents.iter().position(|d| matches(d, filter)) else {
            return Ok(UpdateResult::default());
        };

        let mut merged = data.documents[position].clone();
        for (field, value) in set {
            if field != ID_FIELD {
                merged.insert(field, value);
            }
        }

        if merged == data.documents[position] {
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: 0,
            });
        }

        data.check_unique(collection, &merged, Some(position))?;
        let previous = std::mem::replace(&mut data.documents[position], merged);
        self.commit(&mut state, |s| {
            if let Some(data) = s.collections.get_mut(collection) {
                data.documents[position] = previous;
            }
        })
        .await?;
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let mut state = self.state.write().await;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let Some(position) = data.documents.iter().position(|d| matches(d, filter)) else {
            return Ok(DeleteResult::default());
        };
        let removed = data.documents.remove(position);
        self.commit(&mut state, |s| {
            if let Some(data) = s.collections.get_mut(collection) {
                data.documents.insert(position, removed);
            }
        })
        .await?;
        Ok(DeleteResult { deleted_count: 1 })
    }

    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> Result<(), StoreError> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut state = self.state.write().await;
        let data = state.collections.entry(collection.to_string()).or_default();
        if data.unique_indexes.contains(&fields) {
            return Ok(());
        }
        data.unique_indexes.push(fields);
        self.commit(&mut state, |s| {
            if let Some(data) = s.collections.get_mut(collection) {
                data.unique_indexes.pop();
            }
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::filter_of;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_find_returns_document() {
        let store = MemoryStore::new("test");
        let id = store
            .insert_one("movies", doc(json!({"title": "Dune", "_id": "client"})))
            .await
            .unwrap();

        let found = store
            .find_one("movies", &filter_of([(ID_FIELD, id)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["title"], "Dune");
        assert_eq!(found[ID_FIELD], json!(id.to_hex()));

        let all = store.find("movies", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn find_on_missing_collection_is_empty() {
        let store = MemoryStore::new("test");
        assert!(store.find("nothing", &Filter::new()).await.unwrap().is_empty());
        assert!(store.find_one("nothing", &Filter::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_fields_and_reports_counts() {
        let store = MemoryStore::new("test");
        let id = store
            .insert_one("movies", doc(json!({"title": "Dune", "year": 2021})))
            .await
            .unwrap();
        let by_id = filter_of([(ID_FIELD, id)]);

        let result = store
            .update_one("movies", &by_id, doc(json!({"year": 2024, "_id": "ignored"})))
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });

        let found = store.find_one("movies", &by_id).await.unwrap().unwrap();
        assert_eq!(found["title"], "Dune");
        assert_eq!(found["year"], 2024);
        assert_eq!(found[ID_FIELD], json!(id.to_hex()));

        let unchanged = store
            .update_one("movies", &by_id, doc(json!({"year": 2024})))
            .await
            .unwrap();
        assert_eq!(unchanged, UpdateResult { matched_count: 1, modified_count: 0 });

        let missing = store
            .update_one("movies", &filter_of([(ID_FIELD, ObjectId::new())]), doc(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(missing.matched_count, 0);
    }

    #[tokio::test]
    async fn delete_removes_only_first_match() {
        let store = MemoryStore::new("test");
        store.insert_one("watchList", doc(json!({"addedBy": "u1"}))).await.unwrap();
        store.insert_one("watchList", doc(json!({"addedBy": "u1"}))).await.unwrap();

        let by_owner = filter_of([("addedBy", "u1")]);
        let result = store.delete_one("watchList", &by_owner).await.unwrap();
        assert_eq!(result.deleted_count, 1);
        assert_eq!(store.find("watchList", &by_owner).await.unwrap().len(), 1);

        let none = store
            .delete_one("watchList", &filter_of([("addedBy", "u2")]))
            .await
            .unwrap();
        assert_eq!(none.deleted_count, 0);
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = MemoryStore::new("test");
        store
            .create_unique_index("watchList", &["addedBy", "movieId"])
            .await
            .unwrap();
        // declaring twice is harmless
        store
            .create_unique_index("watchList", &["addedBy", "movieId"])
            .await
            .unwrap();

        store
            .insert_one("watchList", doc(json!({"addedBy": "u1", "movieId": "m1"})))
            .await
            .unwrap();
        store
            .insert_one("watchList", doc(json!({"addedBy": "u2", "movieId": "m1"})))
            .await
            .unwrap();

        let err = store
            .insert_one("watchList", doc(json!({"addedBy": "u1", "movieId": "m1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        let id = {
            let store = MemoryStore::open(&path).await.unwrap();
            store
                .create_unique_index("watchList", &["addedBy", "movieId"])
                .await
                .unwrap();
            store
                .insert_one("watchList", doc(json!({"addedBy": "u1", "movieId": "m1"})))
                .await
                .unwrap();
            store.insert_one("movies", doc(json!({"title": "Alien"}))).await.unwrap()
        };

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.name(), "db");
        let movie = reopened
            .find_one("movies", &filter_of([(ID_FIELD, id)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(movie["title"], "Alien");

        let err = reopened
            .insert_one("watchList", doc(json!({"addedBy": "u1", "movieId": "m1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = MemoryStore::open(data_dir.join("db.json")).await.unwrap();
        store
            .create_unique_index("watchList", &["addedBy", "movieId"])
            .await
            .unwrap();
        let id = store
            .insert_one("movies", doc(json!({"title": "Dune"})))
            .await
            .unwrap();
        let by_id = filter_of([(ID_FIELD, id)]);

        // a plain file where the snapshot directory was makes every write fail
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, b"").unwrap();

        assert!(store
            .insert_one("movies", doc(json!({"title": "Alien"})))
            .await
            .is_err());
        assert_eq!(store.find("movies", &Filter::new()).await.unwrap().len(), 1);

        assert!(store
            .update_one("movies", &by_id, doc(json!({"title": "Dune II"})))
            .await
            .is_err());
        let movie = store.find_one("movies", &by_id).await.unwrap().unwrap();
        assert_eq!(movie["title"], "Dune");

        assert!(store.delete_one("movies", &by_id).await.is_err());
        assert!(store.find_one("movies", &by_id).await.unwrap().is_some());

        assert!(store
            .insert_one("watchList", doc(json!({"addedBy": "u1", "movieId": "m1"})))
            .await
            .is_err());
        assert!(store.find("watchList", &Filter::new()).await.unwrap().is_empty());

        // once writes succeed again the retried insert is not a duplicate
        std::fs::remove_file(&data_dir).unwrap();
        store
            .insert_one("watchList", doc(json!({"addedBy": "u1", "movieId": "m1"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn open_fails_on_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = MemoryStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
