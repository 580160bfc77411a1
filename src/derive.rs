use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::accession::AccessionGenerator;
use crate::domain::{
    ACCESSION_FIELD, Document, EntityKind, ID_FIELD, STATUS_FIELD, Status, string_field,
};
use crate::error::RepoError;
use crate::identity::stamp_new;
use crate::store::{Filter, StoreAccessor};

/// Author-supplied part of a new Dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDataset {
    /// File accessions.
    pub has_file: Vec<String>,
    /// DataAccessPolicy accession.
    pub has_data_access_policy: String,
    /// Title, description, type and any other plain attributes.
    #[serde(flatten)]
    pub attributes: Document,
}

/// Assembles Datasets whose study, sample, experiment and analysis links are
/// derived from the files they contain.
pub struct DatasetComposer<'a, S: StoreAccessor + ?Sized> {
    store: &'a S,
    accessions: &'a AccessionGenerator,
}

impl<'a, S: StoreAccessor + ?Sized> DatasetComposer<'a, S> {
    pub fn new(store: &'a S, accessions: &'a AccessionGenerator) -> Self {
        Self { store, accessions }
    }

    pub fn compose(&self, request: CreateDataset, timestamp: &str) -> Result<Document, RepoError> {
        let policy = self.require_by_accession(
            EntityKind::DataAccessPolicy,
            &request.has_data_access_policy,
        )?;

        let mut files: IndexMap<String, Document> = IndexMap::new();
        for accession in &request.has_file {
            let file = self.require_by_accession(EntityKind::File, accession)?;
            files.insert(document_id(&file)?, file);
        }
        let file_ids: Vec<&str> = files.keys().map(String::as_str).collect();

        let experiments = self
            .store
            .find_many(
                EntityKind::Experiment.collection(),
                &Filter::any_of("has_file", file_ids.iter().copied()),
            )?;
        let analyses = self
            .store
            .find_many(
                EntityKind::Analysis.collection(),
                &Filter::any_of("has_file", file_ids.iter().copied()),
            )?;

        let mut studies = IndexMap::new();
        let mut samples = IndexMap::new();
        for experiment in &experiments {
            self.collect(EntityKind::Study, experiment.get("has_study"), &mut studies)?;
            self.collect(EntityKind::Sample, experiment.get("has_sample"), &mut samples)?;
        }
        for analysis in &analyses {
            self.collect(EntityKind::Study, analysis.get("has_study"), &mut studies)?;
        }

        let mut dataset = request.attributes;
        for field in [ID_FIELD, ACCESSION_FIELD] {
            dataset.remove(field);
        }
        stamp_new(&mut dataset, timestamp);
        if let Some(status) = Status::initial(EntityKind::Dataset) {
            dataset.insert(STATUS_FIELD.to_string(), json!(status.as_str()));
        }
        dataset.insert("has_file".to_string(), json!(file_ids));
        dataset.insert("has_experiment".to_string(), json!(ids_of(&experiments)?));
        dataset.insert("has_analysis".to_string(), json!(ids_of(&analyses)?));
        dataset.insert(
            "has_study".to_string(),
            json!(studies.keys().collect::<Vec<_>>()),
        );
        dataset.insert(
            "has_sample".to_string(),
            json!(samples.keys().collect::<Vec<_>>()),
        );
        dataset.insert(
            "has_data_access_policy".to_string(),
            json!(document_id(&policy)?),
        );

        let accession = self
            .accessions
            .generate(self.store, EntityKind::Dataset, timestamp)?;
        dataset.insert(ACCESSION_FIELD.to_string(), json!(accession.as_str()));

        self.store
            .insert_one(EntityKind::Dataset.collection(), dataset.clone())?;
        info!(
            %accession,
            files = files.len(),
            experiments = experiments.len(),
            studies = studies.len(),
            "dataset created"
        );
        Ok(dataset)
    }

    fn require_by_accession(&self, kind: EntityKind, accession: &str) -> Result<Document, RepoError> {
        self.store
            .find_one(kind.collection(), &Filter::eq(ACCESSION_FIELD, accession))?
            .ok_or_else(|| RepoError::not_found(kind, ACCESSION_FIELD, accession))
    }

    /// Adds the entities named by a reference value (one id or a list) to
    /// `into`, keyed by id so each appears once.
    fn collect(
        &self,
        kind: EntityKind,
        reference: Option<&Value>,
        into: &mut IndexMap<String, Document>,
    ) -> Result<(), RepoError> {
        let ids: Vec<&str> = match reference {
            Some(Value::String(id)) => vec![id.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for id in ids {
            if into.contains_key(id) {
                continue;
            }
            match self.store.find_one(kind.collection(), &Filter::by_id(id))? {
                Some(document) => {
                    into.insert(id.to_string(), document);
                }
                None => warn!(%kind, id, "linked entity not found, leaving it out of the dataset"),
            }
        }
        Ok(())
    }
}

fn document_id(document: &Document) -> Result<String, RepoError> {
    string_field(document, ID_FIELD)
        .map(str::to_string)
        .ok_or_else(|| RepoError::Store("stored document without id".to_string()))
}

fn ids_of(documents: &[Document]) -> Result<Vec<String>, RepoError> {
    documents.iter().map(document_id).collect()
}
