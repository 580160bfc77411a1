use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::sync::{Mutex, RwLock};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde_json::Value;
use tempfile::Builder;

use crate::domain::{ACCESSION_FIELD, Document, ID_FIELD};
use crate::error::RepoError;

/// Collection recording every accession handed out so far.
pub const ACCESSION_TRACKER: &str = "_accession_tracker_";

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Field equals `value`, or is an array containing it.
    Eq { field: String, value: Value },
    /// Field equals, or is an array containing, any of `values`.
    AnyOf { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn by_id(id: &str) -> Self {
        Self::eq(ID_FIELD, id)
    }

    pub fn any_of<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::AnyOf {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => document
                .get(field)
                .is_some_and(|stored| holds(stored, value)),
            Filter::AnyOf { field, values } => document
                .get(field)
                .is_some_and(|stored| values.iter().any(|value| holds(stored, value))),
        }
    }
}

fn holds(stored: &Value, value: &Value) -> bool {
    match stored {
        Value::Array(items) => items.iter().any(|item| item == value),
        other => other == value,
    }
}

/// Document store used by the engine. Implementations are only required to
/// be atomic per document.
pub trait StoreAccessor: Send + Sync {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, RepoError>;
    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, RepoError>;
    fn insert_one(&self, collection: &str, document: Document) -> Result<(), RepoError>;
    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<(), RepoError> {
        for document in documents {
            self.insert_one(collection, document)?;
        }
        Ok(())
    }
    fn delete_one(&self, collection: &str, id: &str) -> Result<bool, RepoError>;
    fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<Option<Document>, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    pub collection: String,
    pub field: String,
}

impl UniqueIndex {
    pub fn new(collection: &str, field: &str) -> Self {
        Self {
            collection: collection.to_string(),
            field: field.to_string(),
        }
    }
}

fn default_indexes() -> Vec<UniqueIndex> {
    vec![UniqueIndex::new(ACCESSION_TRACKER, ACCESSION_FIELD)]
}

fn index_key(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn duplicate_key(collection: &str, field: &str, value: String) -> RepoError {
    RepoError::DuplicateKey {
        collection: collection.to_string(),
        field: field.to_string(),
        value,
    }
}

/// Checks `incoming` against itself and against the values `taken` reports
/// as already present for an indexed field.
fn check_incoming(
    indexes: &[UniqueIndex],
    collection: &str,
    incoming: &[Document],
    taken: impl Fn(&str, &str) -> bool,
) -> Result<(), RepoError> {
    for index in indexes.iter().filter(|index| index.collection == collection) {
        let mut batch = HashSet::new();
        for document in incoming {
            let Some(value) = document.get(&index.field) else {
                continue;
            };
            let key = index_key(value);
            if taken(&index.field, &key) || !batch.insert(key.clone()) {
                return Err(duplicate_key(collection, &index.field, key));
            }
        }
    }
    Ok(())
}

/// Scan-based check for stores that hold no key sets. Only incoming values
/// are compared, so existing duplicates never block unrelated inserts.
fn check_unique<'a>(
    indexes: &[UniqueIndex],
    collection: &str,
    existing: impl IntoIterator<Item = &'a Document>,
    incoming: &[Document],
) -> Result<(), RepoError> {
    let mut wanted: HashMap<&str, HashSet<String>> = HashMap::new();
    for index in indexes.iter().filter(|index| index.collection == collection) {
        let keys = incoming
            .iter()
            .filter_map(|document| document.get(&index.field))
            .map(index_key)
            .collect();
        wanted.insert(index.field.as_str(), keys);
    }
    if wanted.is_empty() {
        return Ok(());
    }

    let mut taken: HashMap<&str, HashSet<String>> = HashMap::new();
    for document in existing {
        for (field, keys) in &wanted {
            if let Some(value) = document.get(*field) {
                let key = index_key(value);
                if keys.contains(&key) {
                    taken.entry(*field).or_default().insert(key);
                }
            }
        }
    }
    check_incoming(indexes, collection, incoming, |field, key| {
        taken.get(field).is_some_and(|keys| keys.contains(key))
    })
}

fn merge_fields(target: &mut Document, fields: &Document) {
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    /// Indexed field -> values currently stored.
    keys: HashMap<String, HashSet<String>>,
}

impl Collection {
    fn is_taken(&self, field: &str, key: &str) -> bool {
        self.keys.get(field).is_some_and(|keys| keys.contains(key))
    }

    fn add_keys(&mut self, indexes: &[UniqueIndex], document: &Document) {
        for index in indexes {
            if let Some(value) = document.get(&index.field) {
                self.keys
                    .entry(index.field.clone())
                    .or_default()
                    .insert(index_key(value));
            }
        }
    }

    fn remove_keys(&mut self, indexes: &[UniqueIndex], document: &Document) {
        for index in indexes {
            if let (Some(value), Some(keys)) =
                (document.get(&index.field), self.keys.get_mut(&index.field))
            {
                keys.remove(&index_key(value));
            }
        }
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    indexes: Vec<UniqueIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            indexes: default_indexes(),
        }
    }

    pub fn with_unique_index(mut self, collection: &str, field: &str) -> Self {
        self.indexes.push(UniqueIndex::new(collection, field));
        self
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|guard| guard.get(collection).map(|c| c.documents.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn indexes_for(&self, collection: &str) -> Vec<UniqueIndex> {
        self.indexes
            .iter()
            .filter(|index| index.collection == collection)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> RepoError {
    RepoError::Store("store lock poisoned".to_string())
}

impl StoreAccessor for MemoryStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, RepoError> {
        let guard = self.collections.read().map_err(poisoned)?;
        Ok(guard
            .get(collection)
            .and_then(|c| c.documents.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, RepoError> {
        let guard = self.collections.read().map_err(poisoned)?;
        Ok(guard
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), RepoError> {
        self.insert_many(collection, vec![document])
    }

    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<(), RepoError> {
        let indexes = self.indexes_for(collection);
        let mut guard = self.collections.write().map_err(poisoned)?;
        let entry = guard.entry(collection.to_string()).or_default();
        check_incoming(&indexes, collection, &documents, |field, key| {
            entry.is_taken(field, key)
        })?;
        for document in &documents {
            entry.add_keys(&indexes, document);
        }
        entry.documents.extend(documents);
        Ok(())
    }

    fn delete_one(&self, collection: &str, id: &str) -> Result<bool, RepoError> {
        let indexes = self.indexes_for(collection);
        let mut guard = self.collections.write().map_err(poisoned)?;
        let Some(entry) = guard.get_mut(collection) else {
            return Ok(false);
        };
        let filter = Filter::by_id(id);
        match entry.documents.iter().position(|doc| filter.matches(doc)) {
            Some(pos) => {
                let removed = entry.documents.remove(pos);
                entry.remove_keys(&indexes, &removed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<Option<Document>, RepoError> {
        let indexes = self.indexes_for(collection);
        let mut guard = self.collections.write().map_err(poisoned)?;
        let Some(entry) = guard.get_mut(collection) else {
            return Ok(None);
        };
        let Some(pos) = entry.documents.iter().position(|doc| filter.matches(doc)) else {
            return Ok(None);
        };

        let current = entry.documents[pos].clone();
        let mut updated = current.clone();
        merge_fields(&mut updated, &fields);
        entry.remove_keys(&indexes, &current);
        let checked = check_incoming(
            &indexes,
            collection,
            std::slice::from_ref(&updated),
            |field, key| entry.is_taken(field, key),
        );
        if let Err(err) = checked {
            entry.add_keys(&indexes, &current);
            return Err(err);
        }
        entry.add_keys(&indexes, &updated);
        entry.documents[pos] = updated.clone();
        Ok(Some(updated))
    }
}

/// Store keeping one JSON array file per collection under `root`.
#[derive(Debug)]
pub struct FileStore {
    root: Utf8PathBuf,
    indexes: Vec<UniqueIndex>,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: Utf8PathBuf) -> Result<Self, RepoError> {
        fs::create_dir_all(root.as_std_path())
            .map_err(|err| RepoError::Filesystem(err.to_string()))?;
        Ok(Self {
            root,
            indexes: default_indexes(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn default_root() -> Result<Utf8PathBuf, RepoError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("metadata-repository")).ok()
            })
            .ok_or_else(|| RepoError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn with_unique_index(mut self, collection: &str, field: &str) -> Self {
        self.indexes.push(UniqueIndex::new(collection, field));
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn collection_path(&self, collection: &str) -> Utf8PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    fn load(&self, collection: &str) -> Result<Vec<Document>, RepoError> {
        let path = self.collection_path(collection);
        if !path.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RepoError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| RepoError::Store(format!("corrupt collection {collection}: {err}")))
    }

    fn save(&self, collection: &str, documents: &[Document]) -> Result<(), RepoError> {
        let path = self.collection_path(collection);
        let content = serde_json::to_vec_pretty(documents)
            .map_err(|err| RepoError::Store(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".collection")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| RepoError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| RepoError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| RepoError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn modify<T>(
        &self,
        collection: &str,
        apply: impl FnOnce(&mut Vec<Document>) -> Result<(T, bool), RepoError>,
    ) -> Result<T, RepoError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut documents = self.load(collection)?;
        let (result, changed) = apply(&mut documents)?;
        if changed {
            self.save(collection, &documents)?;
        }
        Ok(result)
    }
}

impl StoreAccessor for FileStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, RepoError> {
        Ok(self
            .load(collection)?
            .into_iter()
            .find(|doc| filter.matches(doc)))
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, RepoError> {
        Ok(self
            .load(collection)?
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), RepoError> {
        self.insert_many(collection, vec![document])
    }

    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<(), RepoError> {
        self.modify(collection, |docs| {
            check_unique(&self.indexes, collection, docs.iter(), &documents)?;
            docs.extend(documents);
            Ok(((), true))
        })
    }

    fn delete_one(&self, collection: &str, id: &str) -> Result<bool, RepoError> {
        let filter = Filter::by_id(id);
        self.modify(collection, |docs| {
            match docs.iter().position(|doc| filter.matches(doc)) {
                Some(pos) => {
                    docs.remove(pos);
                    Ok((true, true))
                }
                None => Ok((false, false)),
            }
        })
    }

    fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Document,
    ) -> Result<Option<Document>, RepoError> {
        self.modify(collection, |docs| {
            let Some(pos) = docs.iter().position(|doc| filter.matches(doc)) else {
                return Ok((None, false));
            };
            let mut updated = docs[pos].clone();
            merge_fields(&mut updated, &fields);
            let others = docs
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != pos)
                .map(|(_, doc)| doc);
            check_unique(
                &self.indexes,
                collection,
                others,
                std::slice::from_ref(&updated),
            )?;
            docs[pos] = updated.clone();
            Ok((Some(updated), true))
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn filter_matches_scalars_and_arrays() {
        let experiment = doc(json!({"id": "e1", "has_file": ["f1", "f2"], "has_study": "s1"}));
        assert!(Filter::eq("has_study", "s1").matches(&experiment));
        assert!(Filter::eq("has_file", "f2").matches(&experiment));
        assert!(Filter::any_of("has_file", ["f9", "f1"]).matches(&experiment));
        assert!(!Filter::any_of("has_file", ["f9"]).matches(&experiment));
        assert!(!Filter::eq("missing", "x").matches(&experiment));
        assert!(Filter::All.matches(&experiment));
    }

    #[test]
    fn memory_store_rejects_duplicate_tracker_accession() {
        let store = MemoryStore::new();
        let tracker = doc(json!({"accession": "GHGA:FIL000000000001"}));
        store.insert_one(ACCESSION_TRACKER, tracker.clone()).unwrap();
        let err = store.insert_one(ACCESSION_TRACKER, tracker).unwrap_err();
        assert_matches!(err, RepoError::DuplicateKey { .. });
        assert_eq!(store.count(ACCESSION_TRACKER), 1);
    }

    #[test]
    fn memory_store_update_and_delete() {
        let store = MemoryStore::new();
        store
            .insert_one("Dataset", doc(json!({"id": "d1", "status": "unreleased"})))
            .unwrap();
        let updated = store
            .update_fields(
                "Dataset",
                &Filter::by_id("d1"),
                doc(json!({"status": "released"})),
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated["status"], "released");
        assert!(store.delete_one("Dataset", "d1").unwrap());
        assert!(!store.delete_one("Dataset", "d1").unwrap());
        assert!(store.find_one("Dataset", &Filter::by_id("d1")).unwrap().is_none());
    }

    #[test]
    fn memory_store_frees_keys_on_delete_and_checks_updates() {
        let store = MemoryStore::new().with_unique_index("File", "accession");
        let file = |id: &str, accession: &str| doc(json!({"id": id, "accession": accession}));
        store.insert_one("File", file("f1", "GHGA:FIL000000000001")).unwrap();
        store.insert_one("File", file("f2", "GHGA:FIL000000000002")).unwrap();

        let err = store
            .update_fields(
                "File",
                &Filter::by_id("f2"),
                doc(json!({"accession": "GHGA:FIL000000000001"})),
            )
            .unwrap_err();
        assert_matches!(err, RepoError::DuplicateKey { .. });
        let f2 = store.find_one("File", &Filter::by_id("f2")).unwrap().unwrap();
        assert_eq!(f2["accession"], "GHGA:FIL000000000002");

        assert!(store.delete_one("File", "f1").unwrap());
        store.insert_one("File", file("f3", "GHGA:FIL000000000001")).unwrap();
        assert_matches!(
            store.insert_one("File", file("f4", "GHGA:FIL000000000002")),
            Err(RepoError::DuplicateKey { .. })
        );
    }

    #[test]
    fn scan_check_ignores_existing_duplicates() {
        let indexes = default_indexes();
        let existing = vec![
            doc(json!({"accession": "GHGA:SAM000000000001"})),
            doc(json!({"accession": "GHGA:SAM000000000001"})),
        ];
        let fresh = [doc(json!({"accession": "GHGA:SAM000000000002"}))];
        assert!(check_unique(&indexes, ACCESSION_TRACKER, existing.iter(), &fresh).is_ok());

        let repeated = [doc(json!({"accession": "GHGA:SAM000000000001"}))];
        assert_matches!(
            check_unique(&indexes, ACCESSION_TRACKER, existing.iter(), &repeated),
            Err(RepoError::DuplicateKey { .. })
        );
    }
}
