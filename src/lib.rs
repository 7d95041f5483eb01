//! Document ingestion into a persistent full-text index
//!
//! Documents are converted through a fixed field schema and committed to a
//! tantivy index in batches, one transaction per batch.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod schema;
pub mod store;

use std::fs;
use std::path::Path;
use std::sync::Arc;

pub use analysis::{Analyzer, AnalyzerConfig, Language};
pub use batch::BatchWriter;
pub use config::IndexConfig;
pub use document::{DocumentRecord, FieldValue, IndexableDocument};
pub use error::{RecordValidationError, StorageInitError, WriteError};
pub use events::{IndexEvent, IndexEvents, LogEvents};
pub use schema::{create_schema, create_schema_with, DuplicatePolicy, FieldName, IndexSchema};
pub use store::{IndexStore, StoreOptions, WriteTransaction};

/// Initialize env_logger - info for this crate, warn for everything else
pub fn init_logging() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("celene_search=info,warn"),
    )
    .format_timestamp_secs()
    .init();
}

/// Index a JSON array of documents in one batch.
///
/// Returns `(indexed, total)`.
pub fn run(documents_path: &Path, config_path: Option<&Path>) -> Result<(usize, usize), String> {
    let config = match config_path {
        Some(path) => IndexConfig::load(path)
            .map_err(|e| format!("Failed to load config {:?}: {}", path, e))?,
        None => IndexConfig::default(),
    };

    let index_path = config
        .resolve_index_path()
        .map_err(|e| format!("Failed to get search index path: {}", e))?;

    let content = fs::read_to_string(documents_path)
        .map_err(|e| format!("Failed to read {:?}: {}", documents_path, e))?;
    let documents: Vec<DocumentRecord> = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid documents file {:?}: {}", documents_path, e))?;

    let store = IndexStore::open_or_create_with(
        &index_path,
        &config.schema(),
        config.store_options(Arc::new(LogEvents)),
    )
    .map_err(|e| format!("Failed to initialize search index: {}", e))?;

    let indexed = config.batch_writer().add_documents(&store, &documents);
    Ok((indexed, documents.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_indexes_documents_file() {
        let temp_dir = TempDir::new().unwrap();
        let index_path = temp_dir.path().join("index");
        let config_path = temp_dir.path().join("config.json");
        let documents_path = temp_dir.path().join("documents.json");

        fs::write(
            &config_path,
            serde_json::json!({ "indexPath": index_path, "memoryBudgetMb": 50 }).to_string(),
        )
        .unwrap();
        fs::write(
            &documents_path,
            r#"[
                {"id": "a", "title": "Primer documento", "content": "Texto del primero", "author": "Ana"},
                {"id": "b", "title": "Segundo documento", "content": ""},
                {"id": "c", "title": "Tercer documento", "content": "Texto del tercero", "sourceUrl": "https://celene.org/c"}
            ]"#,
        )
        .unwrap();

        let result = run(&documents_path, Some(&config_path)).unwrap();
        assert_eq!(result, (2, 3));

        let store = IndexStore::open_or_create(&index_path, &create_schema()).unwrap();
        assert!(store.contains("a").unwrap());
        assert!(!store.contains("b").unwrap());
        assert!(store.contains("c").unwrap());
    }

    #[test]
    fn test_run_reports_unreadable_documents() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(
            &config_path,
            serde_json::json!({ "indexPath": temp_dir.path().join("index") }).to_string(),
        )
        .unwrap();

        let err = run(&temp_dir.path().join("missing.json"), Some(&config_path)).unwrap_err();
        assert!(err.starts_with("Failed to read"));
    }
}
