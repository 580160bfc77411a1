use assert_matches::assert_matches;
use serde_json::json;

use metadata_repository::domain::{Accession, EntityKind, Status};
use metadata_repository::error::RepoError;

#[test]
fn parse_entity_kind_spellings() {
    let kind: EntityKind = "data_access_policy".parse().unwrap();
    assert_eq!(kind, EntityKind::DataAccessPolicy);
    let kind: EntityKind = "ExperimentProcess".parse().unwrap();
    assert_eq!(kind, EntityKind::ExperimentProcess);
    let kind: EntityKind = "analysis-process".parse().unwrap();
    assert_eq!(kind, EntityKind::AnalysisProcess);
}

#[test]
fn parse_entity_kind_invalid() {
    let err = "genome".parse::<EntityKind>().unwrap_err();
    assert_matches!(err, RepoError::InvalidKind(_));
}

#[test]
fn accession_prefixes() {
    assert_eq!(EntityKind::DataAccessPolicy.accession_prefix(), "DAP");
    assert_eq!(EntityKind::DataAccessCommittee.accession_prefix(), "DAC");
    assert_eq!(EntityKind::Biospecimen.accession_prefix(), "BIO");
    assert_eq!(EntityKind::Experiment.accession_prefix(), "EXP");
    assert_eq!(EntityKind::ExperimentProcess.accession_prefix(), "EXP");
}

#[test]
fn parse_accession() {
    let accession: Accession = "GHGA:STU000000000042".parse().unwrap();
    assert_eq!(accession.prefix(), "STU");
    for invalid in ["STU000000000042", "GHGA:ST000000000042", "GHGA:STU42", "ghga:STU000000000042"] {
        assert_matches!(
            invalid.parse::<Accession>(),
            Err(RepoError::InvalidAccession(_)),
            "{invalid}"
        );
    }
}

#[test]
fn statuses_are_checked_against_kind() {
    assert_eq!(
        Status::parse(EntityKind::Submission, "in progress").unwrap().as_str(),
        "in progress"
    );
    assert_matches!(
        Status::parse(EntityKind::Submission, "unreleased"),
        Err(RepoError::InvalidStatus { .. })
    );
    assert_matches!(
        Status::parse(EntityKind::Sample, "released"),
        Err(RepoError::StatusNotSupported(_))
    );
    assert_eq!(
        Status::initial(EntityKind::Dataset).map(|status| status.as_str()),
        Some("unreleased")
    );
    assert!(Status::initial(EntityKind::File).is_none());
}

#[test]
fn deserialized_accessions_are_validated() {
    let accession: Accession = serde_json::from_value(json!("GHGA:FIL000000000001")).unwrap();
    assert_eq!(accession.prefix(), "FIL");
    assert_eq!(serde_json::to_value(&accession).unwrap(), json!("GHGA:FIL000000000001"));

    assert!(serde_json::from_value::<Accession>(json!("bad")).is_err());
    assert!(serde_json::from_value::<Accession>(json!("GHGA:")).is_err());
}
