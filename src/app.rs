use serde_json::{Value, json};
use tracing::info;

use crate::accession::AccessionGenerator;
use crate::alias;
use crate::config::ResolvedConfig;
use crate::decompose::decompose;
use crate::derive::{CreateDataset, DatasetComposer};
use crate::domain::{
    ACCESSION_FIELD, Document, EntityKind, ID_FIELD, STATUS_FIELD, Status, UPDATE_DATE_FIELD,
    string_field,
};
use crate::error::RepoError;
use crate::expand::ReferenceExpander;
use crate::identity::{Clock, format_timestamp, stamp_new, system_clock};
use crate::persist::GraphPersister;
use crate::store::{Filter, StoreAccessor};
use crate::summary::{DatasetSummary, summarize};

/// Entry points of the repository engine over an injected store.
pub struct Repository<S: StoreAccessor> {
    store: S,
    config: ResolvedConfig,
    accessions: AccessionGenerator,
    clock: Clock,
}

impl<S: StoreAccessor> Repository<S> {
    pub fn new(store: S, config: ResolvedConfig) -> Self {
        let accessions =
            AccessionGenerator::new(&config.accession_namespace, config.accession_max_attempts);
        Self {
            store,
            config,
            accessions,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_accession_generator(mut self, accessions: AccessionGenerator) -> Self {
        self.accessions = accessions;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn now(&self) -> String {
        format_timestamp((self.clock)())
    }

    /// Read path: inlines referenced documents when `requested`, otherwise
    /// hands back the document as stored.
    pub fn expand(
        &self,
        kind: EntityKind,
        document: &Document,
        requested: bool,
    ) -> Result<Document, RepoError> {
        if !requested {
            return Ok(document.clone());
        }
        ReferenceExpander::new(&self.store).expand(kind, document)
    }

    pub fn get_entity(
        &self,
        kind: EntityKind,
        id: &str,
        embedded: bool,
    ) -> Result<Document, RepoError> {
        let document = self.require(kind, ID_FIELD, id)?;
        self.expand(kind, &document, embedded)
    }

    pub fn get_entity_by_accession(
        &self,
        kind: EntityKind,
        accession: &str,
        embedded: bool,
    ) -> Result<Document, RepoError> {
        let document = self.require(kind, ACCESSION_FIELD, accession)?;
        self.expand(kind, &document, embedded)
    }

    pub fn list_ids(&self, kind: EntityKind) -> Result<Vec<String>, RepoError> {
        Ok(self
            .store
            .find_many(kind.collection(), &Filter::All)?
            .iter()
            .filter_map(|document| string_field(document, ID_FIELD).map(str::to_string))
            .collect())
    }

    /// Create path: flattens the nested submission, links aliases, stores
    /// every entity and returns the stored root.
    pub fn ingest_submission(&self, payload: &Document) -> Result<Document, RepoError> {
        let timestamp = self.now();
        let mut decomposition = decompose(EntityKind::Submission, payload, &timestamp)?;
        decomposition.entities = alias::resolve(decomposition.entities, self.config.alias_policy)?;
        self.persister().persist_new(decomposition, &timestamp)
    }

    /// Update path: swaps the stored graph of `submission_id` for `payload`.
    pub fn replace_submission(
        &self,
        submission_id: &str,
        payload: &Document,
    ) -> Result<Document, RepoError> {
        let old_root = self.require(EntityKind::Submission, ID_FIELD, submission_id)?;
        let timestamp = self.now();
        let mut decomposition = decompose(EntityKind::Submission, payload, &timestamp)?;
        decomposition.entities = alias::resolve(decomposition.entities, self.config.alias_policy)?;
        self.persister()
            .persist_replacement(decomposition, &old_root, &timestamp)
    }

    pub fn compose_dataset(&self, request: CreateDataset) -> Result<Document, RepoError> {
        let timestamp = self.now();
        DatasetComposer::new(&self.store, &self.accessions).compose(request, &timestamp)
    }

    /// Sets `status` on a Dataset or Submission found by id or accession.
    /// Requesting the current status changes nothing.
    pub fn patch_status(
        &self,
        kind: EntityKind,
        identifier: &str,
        status: &str,
    ) -> Result<Document, RepoError> {
        let status = Status::parse(kind, status)?;
        let document = self.find_by_id_or_accession(kind, identifier)?;

        if string_field(&document, STATUS_FIELD) == Some(status.as_str()) {
            return Ok(document);
        }

        let id = string_field(&document, ID_FIELD)
            .ok_or_else(|| RepoError::Store(format!("stored {kind} without id")))?;
        let mut fields = Document::new();
        fields.insert(STATUS_FIELD.to_string(), json!(status.as_str()));
        fields.insert(UPDATE_DATE_FIELD.to_string(), json!(self.now()));
        let updated = self
            .store
            .update_fields(kind.collection(), &Filter::by_id(id), fields)?
            .ok_or_else(|| RepoError::not_found(kind, ID_FIELD, id))?;
        info!(%kind, id, status = status.as_str(), "status updated");
        Ok(updated)
    }

    pub fn create_data_access_committee(&self, payload: &Document) -> Result<Document, RepoError> {
        self.create_entity(EntityKind::DataAccessCommittee, payload.clone())
    }

    /// `has_data_access_committee` is given as the committee's accession.
    pub fn create_data_access_policy(&self, payload: &Document) -> Result<Document, RepoError> {
        let field = "has_data_access_committee";
        let committee_accession = string_field(payload, field).ok_or_else(|| {
            RepoError::Validation(format!("'{field}' must name a DataAccessCommittee accession"))
        })?;
        let committee = self.require(
            EntityKind::DataAccessCommittee,
            ACCESSION_FIELD,
            committee_accession,
        )?;

        let mut policy = payload.clone();
        policy.insert(
            field.to_string(),
            committee.get(ID_FIELD).cloned().unwrap_or(Value::Null),
        );
        self.create_entity(EntityKind::DataAccessPolicy, policy)
    }

    pub fn dataset_summary(&self, dataset_id: &str) -> Result<DatasetSummary, RepoError> {
        let dataset = self.get_entity(EntityKind::Dataset, dataset_id, true)?;
        Ok(summarize(&dataset))
    }

    fn create_entity(&self, kind: EntityKind, mut document: Document) -> Result<Document, RepoError> {
        let timestamp = self.now();
        document.remove(ACCESSION_FIELD);
        stamp_new(&mut document, &timestamp);
        let accession = self.accessions.generate(&self.store, kind, &timestamp)?;
        document.insert(ACCESSION_FIELD.to_string(), json!(accession.as_str()));
        self.store.insert_one(kind.collection(), document.clone())?;
        info!(%kind, %accession, "entity created");
        Ok(document)
    }

    fn persister(&self) -> GraphPersister<'_, S> {
        GraphPersister::new(&self.store, &self.accessions, self.config.alias_policy)
    }

    fn require(&self, kind: EntityKind, field: &str, value: &str) -> Result<Document, RepoError> {
        self.store
            .find_one(kind.collection(), &Filter::eq(field, value))?
            .ok_or_else(|| RepoError::not_found(kind, field, value))
    }

    fn find_by_id_or_accession(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<Document, RepoError> {
        if let Some(document) = self
            .store
            .find_one(kind.collection(), &Filter::by_id(identifier))?
        {
            return Ok(document);
        }
        self.require(kind, ACCESSION_FIELD, identifier)
    }
}
