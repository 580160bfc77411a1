use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::accession::AccessionGenerator;
use crate::alias::link_value;
use crate::config::AliasPolicy;
use crate::decompose::{AliasMap, Decomposition};
use crate::domain::{
    ACCESSION_FIELD, CREATION_DATE_FIELD, Document, EntityKind, ID_FIELD, STATUS_FIELD, Status,
    UPDATE_DATE_FIELD, string_field,
};
use crate::error::RepoError;
use crate::identity::stamp_new;
use crate::schema;
use crate::store::{Filter, StoreAccessor};

/// Writes completed so far by a multi-step operation, tracker records
/// included. Once anything has been written, a failure is reported as
/// [`RepoError::PartialWrite`].
#[derive(Debug, Default)]
struct WriteLog {
    completed: Vec<String>,
}

impl WriteLog {
    fn record(&mut self, step: String) {
        self.completed.push(step);
    }

    fn fail(self, err: RepoError) -> RepoError {
        if self.completed.is_empty() {
            return err;
        }
        RepoError::PartialWrite {
            completed: self.completed,
            message: err.to_string(),
        }
    }
}

/// Writes a resolved submission graph: children grouped per collection, then
/// the root carrying inline copies of its direct children.
pub struct GraphPersister<'a, S: StoreAccessor + ?Sized> {
    store: &'a S,
    accessions: &'a AccessionGenerator,
    policy: AliasPolicy,
}

impl<'a, S: StoreAccessor + ?Sized> GraphPersister<'a, S> {
    pub fn new(store: &'a S, accessions: &'a AccessionGenerator, policy: AliasPolicy) -> Self {
        Self {
            store,
            accessions,
            policy,
        }
    }

    /// `decomposition.entities` must already be alias-resolved.
    pub fn persist_new(
        &self,
        decomposition: Decomposition,
        timestamp: &str,
    ) -> Result<Document, RepoError> {
        let Decomposition {
            root_kind,
            mut root,
            entities,
        } = decomposition;
        self.check_root_links(root_kind, &root, &entities)?;

        root.remove(ACCESSION_FIELD);
        stamp_new(&mut root, timestamp);
        if let Some(status) = Status::initial(root_kind) {
            root.insert(STATUS_FIELD.to_string(), json!(status.as_str()));
        }

        self.write_graph(root_kind, root, entities, timestamp, WriteLog::default())
    }

    /// Replaces the graph rooted at `old_root` with `decomposition`, keeping
    /// the old root's id, accession, creation date and status.
    pub fn persist_replacement(
        &self,
        decomposition: Decomposition,
        old_root: &Document,
        timestamp: &str,
    ) -> Result<Document, RepoError> {
        let Decomposition {
            root_kind,
            mut root,
            entities,
        } = decomposition;
        self.check_root_links(root_kind, &root, &entities)?;

        let old_id = string_field(old_root, ID_FIELD)
            .ok_or_else(|| RepoError::Validation(format!("stored {root_kind} has no id")))?
            .to_string();

        for field in [ID_FIELD, ACCESSION_FIELD, CREATION_DATE_FIELD, STATUS_FIELD] {
            match old_root.get(field) {
                Some(value) => root.insert(field.to_string(), value.clone()),
                None => root.remove(field),
            };
        }
        root.insert(UPDATE_DATE_FIELD.to_string(), json!(timestamp));

        let mut log = WriteLog::default();
        if let Err(err) = self.delete_graph(root_kind, &old_id, old_root, &mut log) {
            return Err(log.fail(err));
        }
        self.write_graph(root_kind, root, entities, timestamp, log)
    }

    /// Fails on root references the submission cannot satisfy, before any
    /// write happens.
    fn check_root_links(
        &self,
        root_kind: EntityKind,
        root: &Document,
        entities: &AliasMap,
    ) -> Result<(), RepoError> {
        for field in schema::references(root_kind) {
            if let Some(value) = root.get(field.name) {
                link_value(field, value, self.policy, |alias| {
                    entities
                        .get(alias)
                        .filter(|entity| entity.kind == field.target)
                        .map(|_| Value::Null)
                })?;
            }
        }
        Ok(())
    }

    fn write_graph(
        &self,
        root_kind: EntityKind,
        mut root: Document,
        mut entities: AliasMap,
        timestamp: &str,
        mut log: WriteLog,
    ) -> Result<Document, RepoError> {
        for entity in entities.values_mut() {
            let accession = self
                .accessions
                .generate(self.store, entity.kind, timestamp)
                .map_err(|err| log_fail(&mut log, err))?;
            log.record(format!("tracked {accession}"));
            entity
                .document
                .insert(ACCESSION_FIELD.to_string(), json!(accession.as_str()));
        }
        // A replaced root keeps the accession it was first given.
        if string_field(&root, ACCESSION_FIELD).is_none() {
            let accession = self
                .accessions
                .generate(self.store, root_kind, timestamp)
                .map_err(|err| log_fail(&mut log, err))?;
            log.record(format!("tracked {accession}"));
            root.insert(ACCESSION_FIELD.to_string(), json!(accession.as_str()));
        }

        for field in schema::references(root_kind) {
            let Some(value) = root.get(field.name) else {
                continue;
            };
            let inlined = link_value(field, value, self.policy, |alias| {
                entities
                    .get(alias)
                    .filter(|entity| entity.kind == field.target)
                    .map(|entity| Value::Object(entity.document.clone()))
            })
            .map_err(|err| log_fail(&mut log, err))?;
            if let Some(inlined) = inlined {
                root.insert(field.name.to_string(), inlined);
            }
        }

        let mut groups: IndexMap<EntityKind, Vec<Document>> = IndexMap::new();
        for entity in entities.into_values() {
            groups.entry(entity.kind).or_default().push(entity.document);
        }

        let mut count = 0;
        for (kind, documents) in groups {
            count += documents.len();
            if let Err(err) = self.store.insert_many(kind.collection(), documents) {
                return Err(log.fail(err));
            }
            log.record(format!("inserted {kind}"));
        }

        if let Err(err) = self.store.insert_one(root_kind.collection(), root.clone()) {
            return Err(log.fail(err));
        }

        info!(
            kind = %root_kind,
            id = string_field(&root, ID_FIELD).unwrap_or_default(),
            entities = count,
            "persisted submission graph"
        );
        Ok(root)
    }

    /// Deletes the old root and every entity reachable from it through
    /// declared reference fields.
    fn delete_graph(
        &self,
        root_kind: EntityKind,
        root_id: &str,
        old_root: &Document,
        log: &mut WriteLog,
    ) -> Result<(), RepoError> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert((root_kind, root_id.to_string()));
        queue.extend(referenced_ids(root_kind, old_root));

        while let Some((kind, id)) = queue.pop_front() {
            if !seen.insert((kind, id.clone())) {
                continue;
            }
            let Some(stored) = self.store.find_one(kind.collection(), &Filter::by_id(&id))? else {
                debug!(%kind, id, "previous graph member already gone");
                continue;
            };
            queue.extend(referenced_ids(kind, &stored));
            self.store.delete_one(kind.collection(), &id)?;
            log.record(format!("deleted {kind} {id}"));
        }

        self.store.delete_one(root_kind.collection(), root_id)?;
        log.record(format!("deleted {root_kind} {root_id}"));
        Ok(())
    }
}

fn log_fail(log: &mut WriteLog, err: RepoError) -> RepoError {
    std::mem::take(log).fail(err)
}

/// `(kind, id)` of every reference held by `document`, whether stored as an
/// identifier or as an inline copy.
fn referenced_ids(kind: EntityKind, document: &Document) -> Vec<(EntityKind, String)> {
    let mut ids = Vec::new();
    for field in schema::references(kind) {
        let values = match document.get(field.name) {
            Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
            Some(value) => vec![value],
            None => continue,
        };
        for value in values {
            let id = match value {
                Value::String(id) => Some(id.as_str()),
                Value::Object(inline) => string_field(inline, ID_FIELD),
                _ => None,
            };
            if let Some(id) = id {
                ids.push((field.target, id.to_string()));
            }
        }
    }
    ids
}
