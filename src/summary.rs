use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{ACCESSION_FIELD, Document, string_field};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DatasetSummary {
    pub title: Option<String>,
    pub accession: Option<String>,
    pub ega_accession: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub dataset_type: Option<Value>,
    pub sample_summary: SampleSummary,
    pub study_summary: StudySummary,
    pub experiment_summary: ExperimentSummary,
    pub file_summary: FileSummary,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SampleSummary {
    pub count: usize,
    pub stats: SampleStats,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SampleStats {
    pub sex: SexCounts,
    pub tissues: usize,
    pub phenotypes: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SexCounts {
    pub male: usize,
    pub female: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StudySummary {
    pub count: usize,
    pub accession: Vec<String>,
    pub ega_accession: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExperimentSummary {
    pub count: usize,
    /// Instrument model -> number of sequencing protocols using it.
    pub protocol: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FileSummary {
    pub count: usize,
    pub format: BTreeMap<String, usize>,
    pub size: u64,
}

/// Summarizes a Dataset whose references have already been expanded.
/// References that are still bare identifiers are counted but contribute no
/// statistics.
pub fn summarize(dataset: &Document) -> DatasetSummary {
    let text = |field: &str| string_field(dataset, field).map(str::to_string);
    DatasetSummary {
        title: text("title"),
        accession: text(ACCESSION_FIELD),
        ega_accession: text("ega_accession"),
        description: text("description"),
        dataset_type: dataset.get("type").cloned(),
        sample_summary: sample_summary(references(dataset, "has_sample")),
        study_summary: study_summary(references(dataset, "has_study")),
        experiment_summary: experiment_summary(references(dataset, "has_experiment")),
        file_summary: file_summary(references(dataset, "has_file")),
    }
}

fn references<'a>(document: &'a Document, field: &str) -> Vec<&'a Value> {
    match document.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value],
    }
}

fn embedded<'a>(values: &[&'a Value]) -> Vec<&'a Document> {
    values.iter().copied().filter_map(Value::as_object).collect()
}

fn sample_summary(samples: Vec<&Value>) -> SampleSummary {
    let mut stats = SampleStats::default();
    for sample in embedded(&samples) {
        let individual = sample.get("has_individual").and_then(Value::as_object);
        match individual
            .and_then(|ind| string_field(ind, "sex"))
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("male") => stats.sex.male += 1,
            Some("female") => stats.sex.female += 1,
            Some("unknown") => stats.sex.unknown += 1,
            _ => {}
        }
        if let Some(features) = individual
            .and_then(|ind| ind.get("has_phenotypic_feature"))
            .and_then(Value::as_array)
        {
            stats.phenotypes += features.len();
        }
        let has_tissue = sample
            .get("has_biospecimen")
            .and_then(Value::as_object)
            .and_then(|bio| bio.get("has_anatomical_entity"))
            .is_some_and(|entity| !entity.is_null());
        if has_tissue {
            stats.tissues += 1;
        }
    }
    SampleSummary {
        count: samples.len(),
        stats,
    }
}

fn study_summary(studies: Vec<&Value>) -> StudySummary {
    let mut summary = StudySummary {
        count: studies.len(),
        ..Default::default()
    };
    for study in embedded(&studies) {
        if let Some(accession) = string_field(study, ACCESSION_FIELD) {
            summary.accession.push(accession.to_string());
        }
        if let Some(ega) = string_field(study, "ega_accession") {
            summary.ega_accession.push(ega.to_string());
        }
    }
    summary
}

fn experiment_summary(experiments: Vec<&Value>) -> ExperimentSummary {
    let mut summary = ExperimentSummary {
        count: experiments.len(),
        ..Default::default()
    };
    for experiment in embedded(&experiments) {
        let protocols = references(experiment, "has_protocol");
        for protocol in embedded(&protocols) {
            if let Some(model) = string_field(protocol, "instrument_model") {
                *summary.protocol.entry(model.to_string()).or_default() += 1;
            }
        }
    }
    summary
}

fn file_summary(files: Vec<&Value>) -> FileSummary {
    let mut summary = FileSummary {
        count: files.len(),
        ..Default::default()
    };
    for file in embedded(&files) {
        if let Some(format) = string_field(file, "format") {
            *summary.format.entry(format.to_string()).or_default() += 1;
        }
        let size = file.get("size").and_then(Value::as_u64).unwrap_or(0);
        summary.size = summary.size.saturating_add(size);
    }
    summary
}
