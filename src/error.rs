use std::path::PathBuf;

use thiserror::Error;

use crate::schema::FieldName;

/// Failure to prepare the index location. Fatal, never retried.
#[derive(Error, Debug)]
pub enum StorageInitError {
    #[error("Failed to prepare index directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("Invalid schema file: {0}")]
    SchemaFile(#[from] serde_json::Error),
    #[error("Schema of existing index at {location:?} does not match the configured schema ({detail})")]
    SchemaMismatch { location: PathBuf, detail: String },
}

/// A single document violates a field constraint. The batch carries on without it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    #[error("Required field '{0}' is empty")]
    MissingField(FieldName),
    #[error("Value of '{field}' is {len} bytes, over the {max} byte term limit")]
    TermTooLong {
        field: FieldName,
        len: usize,
        max: usize,
    },
    #[error("Document id '{0}' is already indexed")]
    DuplicateId(String),
}

/// Anything that goes wrong while writing that is not a per-record problem.
/// Aborts the whole batch.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("Transaction already closed")]
    Closed,
}

/// Outcome of a failed append: either the record is rejected on its own or
/// the transaction itself is broken.
#[derive(Error, Debug)]
pub enum AppendError {
    #[error(transparent)]
    Rejected(#[from] RecordValidationError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// A field-policy table that cannot describe a valid index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Field '{0}' is declared more than once")]
    DuplicateField(FieldName),
    #[error("Field '{0}' has no policy")]
    MissingField(FieldName),
    #[error("Field '{0}' is analyzed but is not a text field")]
    AnalyzedNonText(FieldName),
    #[error("Field '{0}' has a boost but is not analyzed")]
    BoostWithoutAnalysis(FieldName),
    #[error("Field '{0}' has a non-positive boost")]
    InvalidBoost(FieldName),
    #[error("Field '{0}' is sortable but is not a date field")]
    SortableNonDate(FieldName),
    #[error("Field '{0}' is unique but is not the id field")]
    UniqueNonId(FieldName),
    #[error("Field '{0}' is scorable but is not a keyword field")]
    ScorableNonKeyword(FieldName),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to get application data directory")]
    NoDataDir,
}
