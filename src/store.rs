use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError, Term};

use crate::analysis::normalize_keyword;
use crate::document::IndexableDocument;
use crate::error::{AppendError, RecordValidationError, StorageInitError, WriteError};
use crate::events::{IndexEvent, IndexEvents, LogEvents};
use crate::schema::{DuplicatePolicy, ExactFilter, FieldName, IndexSchema, SchemaFields};

/// Logical schema written next to the index files on creation
pub const SCHEMA_FILE: &str = "celene-schema.json";

const META_FILE: &str = "meta.json";

/// How a store is opened
#[derive(Clone)]
pub struct StoreOptions {
    /// Fail when an existing index was built with a different schema.
    /// When off, the schema found on disk is trusted.
    pub verify_schema: bool,
    pub events: Arc<dyn IndexEvents>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            verify_schema: true,
            events: Arc::new(LogEvents),
        }
    }
}

/// Stored fields of an indexed document
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub doc_id: String,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub url: Option<String>,
}

/// Owns one on-disk index location
pub struct IndexStore {
    location: PathBuf,
    index: Index,
    reader: IndexReader,
    schema: IndexSchema,
    fields: SchemaFields,
    events: Arc<dyn IndexEvents>,
}

impl IndexStore {
    /// Create or open the index at `location`, verifying the schema of an
    /// existing index
    pub fn open_or_create(
        location: impl AsRef<Path>,
        schema: &IndexSchema,
    ) -> Result<Self, StorageInitError> {
        Self::open_or_create_with(location, schema, StoreOptions::default())
    }

    pub fn open_or_create_with(
        location: impl AsRef<Path>,
        schema: &IndexSchema,
        options: StoreOptions,
    ) -> Result<Self, StorageInitError> {
        let location = location.as_ref().to_path_buf();
        let events = options.events.clone();

        Self::init(location.clone(), schema, options).map_err(|e| {
            events.emit(IndexEvent::StorageFailed {
                location,
                error: e.to_string(),
            });
            e
        })
    }

    fn init(
        location: PathBuf,
        schema: &IndexSchema,
        options: StoreOptions,
    ) -> Result<Self, StorageInitError> {
        let events = options.events;

        if !location.exists() {
            fs::create_dir_all(&location)?;
            events.emit(IndexEvent::DirectoryCreated {
                location: location.clone(),
            });
        }

        let (expected, _) = schema.build();

        let (index, schema) = if location.join(META_FILE).exists() {
            let index = Index::open_in_dir(&location)?;
            let stored = read_schema_file(&location)?;
            let schema = if options.verify_schema {
                verify_schema(&location, &index, &expected, stored.as_ref(), schema)?;
                schema.clone()
            } else {
                stored.unwrap_or_else(|| schema.clone())
            };
            events.emit(IndexEvent::IndexOpened {
                location: location.clone(),
            });
            (index, schema)
        } else {
            let index = Index::create_in_dir(&location, expected)?;
            fs::write(
                location.join(SCHEMA_FILE),
                serde_json::to_string_pretty(schema)?,
            )?;
            events.emit(IndexEvent::IndexCreated {
                location: location.clone(),
            });
            (index, schema.clone())
        };

        schema.analyzer().register(&index);
        let fields = SchemaFields::resolve(&index.schema())?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            location,
            index,
            reader,
            schema,
            fields,
            events,
        })
    }

    /// Open the single write transaction for this store. `memory_budget_mb` bounds
    /// the in-memory buffer; past it, tantivy flushes a segment to disk.
    ///
    /// Fails with a lock error while another writer holds the index. The reader
    /// is reloaded once the lock is held, so duplicate checks see commits made
    /// through other handles.
    pub fn writer(&self, memory_budget_mb: usize) -> Result<WriteTransaction<'_>, WriteError> {
        let budget = memory_budget_mb.saturating_mul(1_000_000);
        let writer: IndexWriter = self.index.writer_with_num_threads(1, budget)?;

        // Holding the lock, nobody else can commit: catch up with other handles
        self.reader.reload()?;

        Ok(WriteTransaction {
            store: self,
            writer: Some(writer),
            appended: 0,
            batch_ids: HashSet::new(),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn events(&self) -> &Arc<dyn IndexEvents> {
        &self.events
    }

    /// Opstamp of the last commit. Unchanged when nothing was committed.
    pub fn generation(&self) -> Result<u64, TantivyError> {
        Ok(self.index.load_metas()?.opstamp)
    }

    /// Pick up commits made through another handle
    pub fn reload(&self) -> Result<(), TantivyError> {
        self.reader.reload()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count() == 0
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Count committed documents whose `field` equals `value`, normalized the
    /// way the field is indexed. Only filterable fields can be matched.
    pub fn count_exact(&self, field: FieldName, value: &str) -> Result<usize, TantivyError> {
        let query = self.exact_query(field, value)?;
        self.reader.searcher().search(&query, &Count)
    }

    pub fn contains(&self, id: &str) -> Result<bool, TantivyError> {
        Ok(self.count_exact(FieldName::DocId, id)? > 0)
    }

    /// Stored fields of every committed entry with this id
    pub fn stored(&self, id: &str) -> Result<Vec<StoredDocument>, TantivyError> {
        let query = self.exact_query(FieldName::DocId, id)?;
        let searcher = self.reader.searcher();

        let total = searcher.search(&query, &Count)?;
        if total == 0 {
            return Ok(vec![]);
        }

        let top_docs = searcher.search(&query, &TopDocs::with_limit(total))?;
        let mut results = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let text = |name: FieldName| {
                doc.get_first(self.fields.get(name))
                    .and_then(|value| value.as_str())
                    .map(|value| value.to_string())
            };
            let timestamp = doc
                .get_first(self.fields.get(FieldName::Timestamp))
                .and_then(|value| value.as_datetime())
                .and_then(|value| DateTime::from_timestamp_micros(value.into_timestamp_micros()));

            results.push(StoredDocument {
                doc_id: text(FieldName::DocId).unwrap_or_default(),
                content: text(FieldName::Content),
                timestamp,
                author: text(FieldName::Author),
                url: text(FieldName::Url),
            });
        }

        Ok(results)
    }

    fn exact_query(&self, field: FieldName, value: &str) -> Result<TermQuery, TantivyError> {
        let value = match self.schema.policy(field).filter {
            ExactFilter::None => {
                return Err(TantivyError::SchemaError(format!(
                    "Field '{}' is not filterable",
                    field
                )))
            }
            ExactFilter::Unique => value.to_string(),
            ExactFilter::CaseInsensitive => normalize_keyword(value),
        };
        let term = Term::from_field_text(self.fields.get(field), &value);
        Ok(TermQuery::new(term, IndexRecordOption::Basic))
    }
}

fn read_schema_file(location: &Path) -> Result<Option<IndexSchema>, StorageInitError> {
    let path = location.join(SCHEMA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn verify_schema(
    location: &Path,
    index: &Index,
    expected: &tantivy::schema::Schema,
    stored: Option<&IndexSchema>,
    schema: &IndexSchema,
) -> Result<(), StorageInitError> {
    if serde_json::to_value(index.schema())? != serde_json::to_value(expected)? {
        return Err(StorageInitError::SchemaMismatch {
            location: location.to_path_buf(),
            detail: "field definitions differ".to_string(),
        });
    }
    if let Some(stored) = stored {
        if stored != schema {
            return Err(StorageInitError::SchemaMismatch {
                location: location.to_path_buf(),
                detail: "field policies differ".to_string(),
            });
        }
    }
    Ok(())
}

/// The exclusive write transaction of a store.
///
/// Dropping it without [`WriteTransaction::commit`] discards everything
/// appended so far.
pub struct WriteTransaction<'s> {
    store: &'s IndexStore,
    writer: Option<IndexWriter>,
    appended: usize,
    batch_ids: HashSet<String>,
}

impl WriteTransaction<'_> {
    /// Append a converted document, applying the schema's duplicate-id policy
    pub fn append(&mut self, document: IndexableDocument) -> Result<u64, AppendError> {
        let writer = self.writer.as_ref().ok_or(WriteError::Closed)?;
        let id = document.doc_id().to_string();
        let id_term = Term::from_field_text(self.store.fields.get(FieldName::DocId), &id);

        match self.store.schema.duplicate_policy() {
            DuplicatePolicy::Append => {}
            DuplicatePolicy::Replace => {
                writer.delete_term(id_term);
            }
            DuplicatePolicy::Reject => {
                let committed = self.store.contains(&id).map_err(WriteError::from)?;
                if committed || self.batch_ids.contains(&id) {
                    return Err(RecordValidationError::DuplicateId(id).into());
                }
            }
        }

        let opstamp = writer
            .add_document(document.into_tantivy(&self.store.fields))
            .map_err(WriteError::from)?;
        self.batch_ids.insert(id);
        self.appended += 1;
        Ok(opstamp)
    }

    /// Number of documents appended so far
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Commit everything appended as one unit and make it visible to the store
    pub fn commit(mut self) -> Result<u64, WriteError> {
        let mut writer = self.writer.take().ok_or(WriteError::Closed)?;
        let opstamp = writer.commit()?;
        drop(writer);

        // Reload reader to see committed changes immediately
        self.store.reader.reload()?;
        Ok(opstamp)
    }

    /// Discard everything appended
    pub fn rollback(mut self) -> Result<(), WriteError> {
        let mut writer = self.writer.take().ok_or(WriteError::Closed)?;
        writer.rollback()?;
        self.store.events.emit(IndexEvent::TransactionDiscarded {
            appended: self.appended,
        });
        Ok(())
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            self.store.events.emit(IndexEvent::TransactionDiscarded {
                appended: self.appended,
            });
        }
    }
}
