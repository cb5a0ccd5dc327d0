use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the migration pipeline.
///
/// Configuration problems and malformed vocabulary inputs are fatal and
/// surface before any output is produced. Resolution misses are not
/// errors; they are recorded as the concept id `0` sentinel.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("table {table} is missing required column {column}")]
    MissingColumn { table: String, column: String },

    #[error("no match candidates for vocabulary {vocabulary_id} (domain {domain_id}, class {concept_class_id})")]
    NoMatchCandidates {
        vocabulary_id: String,
        domain_id: String,
        concept_class_id: String,
    },

    #[error("malformed custom mapping row {row}: {reason}")]
    MalformedMapping { row: usize, reason: String },

    #[error("stage {stage} requires {dependency}, which has not run")]
    MissingStage {
        stage: &'static str,
        dependency: &'static str,
    },

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    pub fn message(text: impl Into<String>) -> Self {
        EtlError::Message(text.into())
    }
}
