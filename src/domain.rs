use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RepoError;

/// A stored entity: a loosely typed JSON object.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const ACCESSION_FIELD: &str = "accession";
pub const ALIAS_FIELD: &str = "alias";
pub const STATUS_FIELD: &str = "status";
pub const CREATION_DATE_FIELD: &str = "creation_date";
pub const UPDATE_DATE_FIELD: &str = "update_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Analysis,
    AnalysisProcess,
    Biospecimen,
    DataAccessCommittee,
    DataAccessPolicy,
    Dataset,
    Experiment,
    ExperimentProcess,
    File,
    Individual,
    Member,
    Project,
    Protocol,
    Publication,
    Sample,
    Study,
    Submission,
    Technology,
    Workflow,
}

impl EntityKind {
    pub const ALL: [EntityKind; 19] = [
        EntityKind::Analysis,
        EntityKind::AnalysisProcess,
        EntityKind::Biospecimen,
        EntityKind::DataAccessCommittee,
        EntityKind::DataAccessPolicy,
        EntityKind::Dataset,
        EntityKind::Experiment,
        EntityKind::ExperimentProcess,
        EntityKind::File,
        EntityKind::Individual,
        EntityKind::Member,
        EntityKind::Project,
        EntityKind::Protocol,
        EntityKind::Publication,
        EntityKind::Sample,
        EntityKind::Study,
        EntityKind::Submission,
        EntityKind::Technology,
        EntityKind::Workflow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Analysis => "Analysis",
            EntityKind::AnalysisProcess => "AnalysisProcess",
            EntityKind::Biospecimen => "Biospecimen",
            EntityKind::DataAccessCommittee => "DataAccessCommittee",
            EntityKind::DataAccessPolicy => "DataAccessPolicy",
            EntityKind::Dataset => "Dataset",
            EntityKind::Experiment => "Experiment",
            EntityKind::ExperimentProcess => "ExperimentProcess",
            EntityKind::File => "File",
            EntityKind::Individual => "Individual",
            EntityKind::Member => "Member",
            EntityKind::Project => "Project",
            EntityKind::Protocol => "Protocol",
            EntityKind::Publication => "Publication",
            EntityKind::Sample => "Sample",
            EntityKind::Study => "Study",
            EntityKind::Submission => "Submission",
            EntityKind::Technology => "Technology",
            EntityKind::Workflow => "Workflow",
        }
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &'static str {
        self.name()
    }

    pub fn accession_prefix(&self) -> String {
        match self {
            EntityKind::DataAccessPolicy => "DAP".to_string(),
            EntityKind::DataAccessCommittee => "DAC".to_string(),
            other => other.name()[..3].to_uppercase(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EntityKind {
    type Err = RepoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace(['_', '-'], "").to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.name().to_lowercase() == normalized)
            .ok_or_else(|| RepoError::InvalidKind(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub(crate) fn compose(namespace: &str, kind: EntityKind, number: u64) -> Self {
        Self(format!(
            "{namespace}:{}{number:012}",
            kind.accession_prefix()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        let local = self.0.split_once(':').map(|(_, rest)| rest).unwrap_or("");
        local.get(..3).unwrap_or(local)
    }
}

impl TryFrom<String> for Accession {
    type Error = RepoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(accession: Accession) -> Self {
        accession.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = RepoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^[A-Z][A-Z0-9]*:[A-Z]{3}\d{12}$").expect("accession pattern compiles")
        });
        let normalized = value.trim();
        if !pattern.is_match(normalized) {
            return Err(RepoError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Unreleased,
    Released,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Unreleased => "unreleased",
            DatasetStatus::Released => "released",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "in progress",
            SubmissionStatus::Completed => "completed",
        }
    }
}

/// A status value checked against the kind it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Dataset(DatasetStatus),
    Submission(SubmissionStatus),
}

impl Status {
    pub fn parse(kind: EntityKind, value: &str) -> Result<Self, RepoError> {
        let invalid = || RepoError::InvalidStatus {
            kind: kind.to_string(),
            value: value.to_string(),
        };
        match kind {
            EntityKind::Dataset => match value.trim() {
                "unreleased" => Ok(Status::Dataset(DatasetStatus::Unreleased)),
                "released" => Ok(Status::Dataset(DatasetStatus::Released)),
                _ => Err(invalid()),
            },
            EntityKind::Submission => match value.trim() {
                "in progress" | "in_progress" => {
                    Ok(Status::Submission(SubmissionStatus::InProgress))
                }
                "completed" => Ok(Status::Submission(SubmissionStatus::Completed)),
                _ => Err(invalid()),
            },
            other => Err(RepoError::StatusNotSupported(other.to_string())),
        }
    }

    /// Status a freshly created entity of `kind` starts in, if it has one.
    pub fn initial(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Dataset => Some(Status::Dataset(DatasetStatus::Unreleased)),
            EntityKind::Submission => Some(Status::Submission(SubmissionStatus::InProgress)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Dataset(status) => status.as_str(),
            Status::Submission(status) => status.as_str(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub(crate) fn string_field<'a>(document: &'a Document, field: &str) -> Option<&'a str> {
    document.get(field).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_kind_accepts_snake_case() {
        let kind: EntityKind = "data_access_policy".parse().unwrap();
        assert_eq!(kind, EntityKind::DataAccessPolicy);
        let kind: EntityKind = "Study".parse().unwrap();
        assert_eq!(kind, EntityKind::Study);
    }

    #[test]
    fn parse_kind_invalid() {
        let err = "Spaceship".parse::<EntityKind>().unwrap_err();
        assert_matches!(err, RepoError::InvalidKind(_));
    }

    #[test]
    fn accession_prefixes() {
        assert_eq!(EntityKind::DataAccessPolicy.accession_prefix(), "DAP");
        assert_eq!(EntityKind::DataAccessCommittee.accession_prefix(), "DAC");
        assert_eq!(EntityKind::File.accession_prefix(), "FIL");
        assert_eq!(EntityKind::Study.accession_prefix(), "STU");
    }

    #[test]
    fn compose_pads_number() {
        let acc = Accession::compose("GHGA", EntityKind::File, 42);
        assert_eq!(acc.as_str(), "GHGA:FIL000000000042");
        assert_eq!(acc.prefix(), "FIL");
    }

    #[test]
    fn status_checked_per_kind() {
        assert_eq!(
            Status::parse(EntityKind::Dataset, "released").unwrap(),
            Status::Dataset(DatasetStatus::Released)
        );
        assert_matches!(
            Status::parse(EntityKind::Dataset, "completed"),
            Err(RepoError::InvalidStatus { .. })
        );
        assert_matches!(
            Status::parse(EntityKind::File, "released"),
            Err(RepoError::StatusNotSupported(_))
        );
    }
}
