//! Declared reference fields per entity kind.
//!
//! Every component that walks references (expansion, decomposition, alias
//! resolution, persistence, provenance) consults this table. Attributes that
//! are not listed here are plain metadata, whatever their name.

use crate::domain::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceField {
    pub name: &'static str,
    pub cardinality: Cardinality,
    pub target: EntityKind,
}

const fn one(name: &'static str, target: EntityKind) -> ReferenceField {
    ReferenceField {
        name,
        cardinality: Cardinality::One,
        target,
    }
}

const fn many(name: &'static str, target: EntityKind) -> ReferenceField {
    ReferenceField {
        name,
        cardinality: Cardinality::Many,
        target,
    }
}

const SUBMISSION: &[ReferenceField] = &[
    one("has_study", EntityKind::Study),
    one("has_project", EntityKind::Project),
    many("has_sample", EntityKind::Sample),
    many("has_biospecimen", EntityKind::Biospecimen),
    many("has_individual", EntityKind::Individual),
    many("has_experiment", EntityKind::Experiment),
    many("has_experiment_process", EntityKind::ExperimentProcess),
    many("has_protocol", EntityKind::Protocol),
    many("has_technology", EntityKind::Technology),
    many("has_analysis", EntityKind::Analysis),
    many("has_analysis_process", EntityKind::AnalysisProcess),
    many("has_workflow", EntityKind::Workflow),
    many("has_file", EntityKind::File),
    many("has_publication", EntityKind::Publication),
    many("has_member", EntityKind::Member),
    one("has_data_access_policy", EntityKind::DataAccessPolicy),
    one("has_data_access_committee", EntityKind::DataAccessCommittee),
];

const STUDY: &[ReferenceField] = &[
    one("has_project", EntityKind::Project),
    many("has_publication", EntityKind::Publication),
];

const PROJECT: &[ReferenceField] = &[many("has_publication", EntityKind::Publication)];

const EXPERIMENT: &[ReferenceField] = &[
    one("has_study", EntityKind::Study),
    one("has_sample", EntityKind::Sample),
    one("has_technology", EntityKind::Technology),
    many("has_protocol", EntityKind::Protocol),
    many("has_file", EntityKind::File),
];

const EXPERIMENT_PROCESS: &[ReferenceField] = &[
    one("has_experiment", EntityKind::Experiment),
    one("has_protocol", EntityKind::Protocol),
];

const ANALYSIS: &[ReferenceField] = &[
    one("has_study", EntityKind::Study),
    one("has_workflow", EntityKind::Workflow),
    many("has_file", EntityKind::File),
];

const ANALYSIS_PROCESS: &[ReferenceField] = &[
    one("has_analysis", EntityKind::Analysis),
    one("has_workflow", EntityKind::Workflow),
];

const SAMPLE: &[ReferenceField] = &[
    one("has_individual", EntityKind::Individual),
    one("has_biospecimen", EntityKind::Biospecimen),
];

const BIOSPECIMEN: &[ReferenceField] = &[one("has_individual", EntityKind::Individual)];

const INDIVIDUAL: &[ReferenceField] = &[many("has_parent", EntityKind::Individual)];

const DATASET: &[ReferenceField] = &[
    many("has_file", EntityKind::File),
    many("has_experiment", EntityKind::Experiment),
    many("has_analysis", EntityKind::Analysis),
    many("has_study", EntityKind::Study),
    many("has_sample", EntityKind::Sample),
    many("has_publication", EntityKind::Publication),
    one("has_data_access_policy", EntityKind::DataAccessPolicy),
];

const DATA_ACCESS_POLICY: &[ReferenceField] =
    &[one("has_data_access_committee", EntityKind::DataAccessCommittee)];

const DATA_ACCESS_COMMITTEE: &[ReferenceField] = &[many("has_member", EntityKind::Member)];

/// Reference fields declared for `kind`, in declaration order.
pub fn references(kind: EntityKind) -> &'static [ReferenceField] {
    match kind {
        EntityKind::Submission => SUBMISSION,
        EntityKind::Study => STUDY,
        EntityKind::Project => PROJECT,
        EntityKind::Experiment => EXPERIMENT,
        EntityKind::ExperimentProcess => EXPERIMENT_PROCESS,
        EntityKind::Analysis => ANALYSIS,
        EntityKind::AnalysisProcess => ANALYSIS_PROCESS,
        EntityKind::Sample => SAMPLE,
        EntityKind::Biospecimen => BIOSPECIMEN,
        EntityKind::Individual => INDIVIDUAL,
        EntityKind::Dataset => DATASET,
        EntityKind::DataAccessPolicy => DATA_ACCESS_POLICY,
        EntityKind::DataAccessCommittee => DATA_ACCESS_COMMITTEE,
        EntityKind::File
        | EntityKind::Member
        | EntityKind::Protocol
        | EntityKind::Publication
        | EntityKind::Technology
        | EntityKind::Workflow => &[],
    }
}

pub fn reference(kind: EntityKind, name: &str) -> Option<&'static ReferenceField> {
    references(kind).iter().find(|field| field.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_form_attributes_are_not_references() {
        assert!(reference(EntityKind::Sample, "has_attribute").is_none());
        assert!(reference(EntityKind::Individual, "has_phenotypic_feature").is_none());
    }

    #[test]
    fn experiment_links_one_study_many_files() {
        let study = reference(EntityKind::Experiment, "has_study").unwrap();
        assert_eq!(study.cardinality, Cardinality::One);
        assert_eq!(study.target, EntityKind::Study);
        let files = reference(EntityKind::Experiment, "has_file").unwrap();
        assert_eq!(files.cardinality, Cardinality::Many);
    }

    #[test]
    fn field_names_follow_target_kind() {
        for kind in EntityKind::ALL {
            for field in references(kind) {
                assert!(field.name.starts_with("has_"), "{kind}.{}", field.name);
            }
        }
    }
}
