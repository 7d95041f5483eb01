//! Indexer configuration
//!
//! Loaded from an optional JSON file; every key has a default.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::AnalyzerConfig;
use crate::batch::{BatchWriter, DEFAULT_MEMORY_BUDGET_MB};
use crate::error::ConfigError;
use crate::events::IndexEvents;
use crate::schema::{create_schema_with, DuplicatePolicy, IndexSchema};
use crate::store::StoreOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    /// Index directory; the platform data directory when unset
    pub index_path: Option<PathBuf>,
    pub memory_budget_mb: usize,
    pub analyzer: AnalyzerConfig,
    pub duplicate_policy: DuplicatePolicy,
    /// Refuse to open an existing index built with a different schema
    pub verify_schema: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            memory_budget_mb: DEFAULT_MEMORY_BUDGET_MB,
            analyzer: AnalyzerConfig::default(),
            duplicate_policy: DuplicatePolicy::default(),
            verify_schema: true,
        }
    }
}

impl IndexConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Get the path to the search index directory
    pub fn resolve_index_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.index_path {
            return Ok(path.clone());
        }
        ProjectDirs::from("org", "celene", "CeleneSearch")
            .map(|dirs| dirs.data_dir().join("search_index"))
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn schema(&self) -> IndexSchema {
        create_schema_with(self.analyzer.clone(), self.duplicate_policy)
    }

    pub fn store_options(&self, events: Arc<dyn IndexEvents>) -> StoreOptions {
        StoreOptions {
            verify_schema: self.verify_schema,
            events,
        }
    }

    pub fn batch_writer(&self) -> BatchWriter {
        BatchWriter::new().with_memory_budget_mb(self.memory_budget_mb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Language;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: IndexConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, IndexConfig::default());
        assert_eq!(config.memory_budget_mb, 512);
        assert!(config.verify_schema);
        assert_eq!(config.schema(), crate::schema::create_schema());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("celene.json");
        fs::write(
            &path,
            r#"{
                "indexPath": "/var/lib/celene/index",
                "memoryBudgetMb": 64,
                "analyzer": { "language": "english", "minTokenLen": 3 },
                "duplicatePolicy": "replace",
                "verifySchema": false
            }"#,
        )
        .unwrap();

        let config = IndexConfig::load(&path).unwrap();

        assert_eq!(config.resolve_index_path().unwrap(), PathBuf::from("/var/lib/celene/index"));
        assert_eq!(config.memory_budget_mb, 64);
        assert_eq!(config.analyzer.language, Language::English);
        assert_eq!(config.analyzer.min_token_len, 3);
        assert!(config.analyzer.extra_stopwords.is_empty());
        assert_eq!(config.schema().duplicate_policy(), DuplicatePolicy::Replace);
        assert!(!config.verify_schema);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("celene.json");
        fs::write(&path, r#"{ "duplicatePolicy": "overwrite" }"#).unwrap();

        assert!(matches!(IndexConfig::load(&path), Err(ConfigError::Json(_))));
        assert!(matches!(
            IndexConfig::load(&temp_dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
