use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RepoError {
    #[error("{kind} with {field} '{value}' not found")]
    NotFound {
        kind: String,
        field: String,
        value: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("embedded {kind} under '{field}' has no alias")]
    #[diagnostic(help("every entity nested in a submission needs a unique string `alias`"))]
    MissingAlias { kind: String, field: String },

    #[error("alias '{0}' is used by more than one entity in the submission")]
    DuplicateAlias(String),

    #[error("reference '{alias}' in '{field}' does not name an entity of this submission")]
    DanglingAlias { alias: String, field: String },

    #[error("invalid status '{value}' for {kind}")]
    InvalidStatus { kind: String, value: String },

    #[error("{0} has no status")]
    StatusNotSupported(String),

    #[error("unknown entity kind: {0}")]
    InvalidKind(String),

    #[error("invalid accession: {0}")]
    InvalidAccession(String),

    #[error("duplicate value '{value}' for unique field '{field}' in collection {collection}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    #[error("no free accession for {kind} after {attempts} attempts")]
    AccessionExhausted { kind: String, attempts: usize },

    #[error("store operation failed: {0}")]
    Store(String),

    #[error("write interrupted after persisting [{}]: {message}", completed.join(", "))]
    #[diagnostic(help(
        "the store may hold a partial graph and issued accessions; nothing was rolled back"
    ))]
    PartialWrite {
        completed: Vec<String>,
        message: String,
    },

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl RepoError {
    /// Whether the failure was caused by the request rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RepoError::NotFound { .. }
                | RepoError::Validation(_)
                | RepoError::MissingAlias { .. }
                | RepoError::DuplicateAlias(_)
                | RepoError::DanglingAlias { .. }
                | RepoError::InvalidStatus { .. }
                | RepoError::StatusNotSupported(_)
                | RepoError::InvalidKind(_)
                | RepoError::InvalidAccession(_)
                | RepoError::Payload(_)
        )
    }

    /// Process exit status for the command-line tool.
    pub fn exit_code(&self) -> u8 {
        match self {
            RepoError::PartialWrite { .. } => 3,
            error if error.is_client_error() => 2,
            _ => 1,
        }
    }

    pub(crate) fn not_found(kind: impl ToString, field: &str, value: &str) -> Self {
        RepoError::NotFound {
            kind: kind.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}
