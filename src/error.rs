use std::path::PathBuf;
use thiserror::Error;
use crate::parsers::background_parser::{GOTermID, TaxonID};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed lineage file '{}' at line {line}: {reason}", path.display())]
    MalformedLineage {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("unsupported study population input '{}': expected {expected}", path.display())]
    UnsupportedInput {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("malformed study population file '{}' at line {line}: {reason}", path.display())]
    MalformedStudyPopulation {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed background file '{}' at line {line}: {reason}", path.display())]
    MalformedBackground {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("enrichment table '{}' is missing column '{column}'", path.display())]
    MissingColumn {
        path: PathBuf,
        column: &'static str,
    },

    #[error("malformed enrichment table '{}': {reason}", path.display())]
    MalformedEnrichmentTable {
        path: PathBuf,
        reason: String,
    },

    #[error("results directory '{}' does not contain '{expected}'", path.display())]
    MissingResultsDir {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("no enrichment table for {0}")]
    MissingEnrichmentTable(String),

    #[error("taxon {0} is not present in the lineage")]
    UnknownTaxon(TaxonID),

    #[error("GO:{go_id:07} has a non-finite log(Odds Ratio): {value}")]
    InvalidEnrichmentScore {
        go_id: GOTermID,
        value: f64,
    },

    #[error("unrecognized evidence code '{0}'")]
    UnknownEvidenceCode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl NetworkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NetworkError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
