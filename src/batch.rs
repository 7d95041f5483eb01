use std::sync::Arc;

use crate::document::{DocumentRecord, IndexableDocument};
use crate::error::{AppendError, WriteError};
use crate::events::{IndexEvent, IndexEvents};
use crate::schema::IndexSchema;
use crate::store::IndexStore;

/// In-memory buffer of a batch transaction when nothing else is configured
pub const DEFAULT_MEMORY_BUDGET_MB: usize = 512;

/// Commits batches of documents, one transaction per batch.
///
/// A record that fails validation is logged and skipped; the rest of the batch
/// still commits. A failure of the transaction itself aborts the whole batch.
#[derive(Clone)]
pub struct BatchWriter {
    memory_budget_mb: usize,
    events: Option<Arc<dyn IndexEvents>>,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter {
    /// Writer reporting through the events of the store it writes to
    pub fn new() -> Self {
        Self {
            memory_budget_mb: DEFAULT_MEMORY_BUDGET_MB,
            events: None,
        }
    }

    pub fn with_events(self, events: Arc<dyn IndexEvents>) -> Self {
        Self {
            events: Some(events),
            ..self
        }
    }

    pub fn with_memory_budget_mb(self, memory_budget_mb: usize) -> Self {
        Self {
            memory_budget_mb,
            ..self
        }
    }

    /// Index `records` in one transaction and return how many were committed.
    ///
    /// Returns 0 without touching the store for an empty batch, and 0 when the
    /// batch is aborted.
    pub fn add_documents(&self, store: &IndexStore, records: &[DocumentRecord]) -> usize {
        let events = self.events.as_ref().unwrap_or(store.events());

        if records.is_empty() {
            events.emit(IndexEvent::EmptyBatch);
            return 0;
        }

        events.emit(IndexEvent::BatchStarted {
            total: records.len(),
        });

        match self.write_batch(store, records, &**events) {
            Ok((succeeded, opstamp)) => {
                events.emit(IndexEvent::BatchCommitted {
                    succeeded,
                    total: records.len(),
                    opstamp,
                });
                succeeded
            }
            Err(e) => {
                events.emit(IndexEvent::BatchAborted {
                    error: e.to_string(),
                });
                0
            }
        }
    }

    fn write_batch(
        &self,
        store: &IndexStore,
        records: &[DocumentRecord],
        events: &dyn IndexEvents,
    ) -> Result<(usize, u64), WriteError> {
        // Rolled back on drop if anything below returns early
        let mut txn = store.writer(self.memory_budget_mb)?;
        let succeeded = append_records(records, store.schema(), events, |doc| txn.append(doc))?;

        let opstamp = txn.commit()?;
        Ok((succeeded, opstamp))
    }
}

/// Feed every record to `append`, skipping rejected ones. Stops at the first
/// write failure.
fn append_records(
    records: &[DocumentRecord],
    schema: &IndexSchema,
    events: &dyn IndexEvents,
    mut append: impl FnMut(IndexableDocument) -> Result<u64, AppendError>,
) -> Result<usize, WriteError> {
    let mut succeeded = 0;

    for record in records {
        let appended = record
            .to_indexable(schema)
            .map_err(AppendError::from)
            .and_then(&mut append);

        match appended {
            Ok(_) => succeeded += 1,
            Err(AppendError::Rejected(e)) => {
                events.emit(IndexEvent::RecordRejected {
                    id: record.display_id().to_string(),
                    error: e.to_string(),
                });
            }
            Err(AppendError::Write(e)) => return Err(e),
        }
    }

    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerConfig;
    use crate::events::testing::RecordingEvents;
    use crate::schema::{create_schema, create_schema_with, DuplicatePolicy, FieldName, IndexSchema};
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    fn create_test_store(schema: &IndexSchema) -> (IndexStore, Arc<RecordingEvents>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let events = Arc::new(RecordingEvents::default());
        let options = StoreOptions {
            events: events.clone(),
            ..StoreOptions::default()
        };
        let store = IndexStore::open_or_create_with(temp_dir.path(), schema, options).unwrap();
        (store, events, temp_dir)
    }

    fn writer() -> BatchWriter {
        BatchWriter::new().with_memory_budget_mb(50)
    }

    fn records(n: usize) -> Vec<DocumentRecord> {
        (0..n)
            .map(|i| {
                DocumentRecord::new(
                    format!("doc-{}", i),
                    format!("Documento número {}", i),
                    format!("Contenido del documento {}", i),
                )
            })
            .collect()
    }

    #[test]
    fn test_valid_batch_is_fully_committed() {
        let (store, events, _dir) = create_test_store(&create_schema());
        let batch = records(5);

        assert_eq!(writer().add_documents(&store, &batch), 5);

        assert_eq!(store.doc_count(), 5);
        for record in &batch {
            assert!(store.contains(record.id()).unwrap());
        }
        assert!(matches!(
            events.events().last(),
            Some(IndexEvent::BatchCommitted {
                succeeded: 5,
                total: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_batch_opens_no_transaction() {
        let (store, events, _dir) = create_test_store(&create_schema());
        let before = store.generation().unwrap();

        // Holding the writer lock proves add_documents never asks for it
        let _txn = store.writer(50).unwrap();
        assert_eq!(writer().add_documents(&store, &[]), 0);

        assert_eq!(store.generation().unwrap(), before);
        assert_eq!(events.events().last(), Some(&IndexEvent::EmptyBatch));
    }

    #[test]
    fn test_invalid_record_does_not_abort_batch() {
        let (store, events, _dir) = create_test_store(&create_schema());
        let mut batch = records(4);
        batch.insert(2, DocumentRecord::new("broken", "Sin contenido", "   "));
        let before = store.generation().unwrap();

        assert_eq!(writer().add_documents(&store, &batch), 4);

        assert!(store.generation().unwrap() > before);
        assert_eq!(store.doc_count(), 4);
        assert!(!store.contains("broken").unwrap());
        assert!(events.events().contains(&IndexEvent::RecordRejected {
            id: "broken".to_string(),
            error: "Required field 'content' is empty".to_string(),
        }));
    }

    #[test]
    fn test_missing_id_is_logged_with_placeholder() {
        let (store, events, _dir) = create_test_store(&create_schema());
        let batch = vec![DocumentRecord::new("", "Título", "Contenido")];

        assert_eq!(writer().add_documents(&store, &batch), 0);

        assert!(events.events().iter().any(|event| matches!(
            event,
            IndexEvent::RecordRejected { id, .. } if id == "<unknown>"
        )));
        // the batch itself still committed
        assert!(matches!(
            events.events().last(),
            Some(IndexEvent::BatchCommitted { succeeded: 0, total: 1, .. })
        ));
    }

    #[test]
    fn test_transaction_failure_aborts_batch() {
        let (store, events, _dir) = create_test_store(&create_schema());
        let before = store.generation().unwrap();

        let _held = store.writer(50).unwrap();
        assert_eq!(writer().add_documents(&store, &records(3)), 0);

        assert_eq!(store.generation().unwrap(), before);
        assert!(matches!(
            events.events().last(),
            Some(IndexEvent::BatchAborted { .. })
        ));
    }

    #[test]
    fn test_memory_budget_too_small_aborts_batch() {
        let (store, events, _dir) = create_test_store(&create_schema());

        let count = BatchWriter::new()
            .with_memory_budget_mb(1)
            .add_documents(&store, &records(2));

        assert_eq!(count, 0);
        assert!(store.is_empty());
        assert!(matches!(
            events.events().last(),
            Some(IndexEvent::BatchAborted { .. })
        ));
    }

    #[test]
    fn test_write_failure_mid_batch_stops_and_commits_nothing() {
        let (store, events, _dir) = create_test_store(&create_schema());
        let before = store.generation().unwrap();
        let batch = records(4);

        let mut txn = store.writer(50).unwrap();
        let mut seen = Vec::new();
        let result = append_records(&batch, store.schema(), &*events, |doc| {
            seen.push(doc.doc_id().to_string());
            if seen.len() == 2 {
                return Err(WriteError::Closed.into());
            }
            txn.append(doc)
        });
        assert!(matches!(result, Err(WriteError::Closed)));
        assert_eq!(seen, vec!["doc-0", "doc-1"]);
        drop(txn);

        store.reload().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.generation().unwrap(), before);
        assert!(!events
            .events()
            .iter()
            .any(|event| matches!(event, IndexEvent::RecordRejected { .. })));
    }

    #[test]
    fn test_append_policy_keeps_every_version() {
        let (store, _events, _dir) = create_test_store(&create_schema());
        let first = DocumentRecord::new("same", "Versión uno", "Primera versión");
        let second = DocumentRecord::new("same", "Versión dos", "Segunda versión");

        assert_eq!(writer().add_documents(&store, &[first]), 1);
        assert_eq!(writer().add_documents(&store, &[second]), 1);

        assert_eq!(store.count_exact(FieldName::DocId, "same").unwrap(), 2);
    }

    #[test]
    fn test_replace_policy_keeps_latest_version() {
        let schema = create_schema_with(AnalyzerConfig::default(), DuplicatePolicy::Replace);
        let (store, _events, _dir) = create_test_store(&schema);

        let batch = vec![
            DocumentRecord::new("same", "Uno", "Primera versión"),
            DocumentRecord::new("same", "Dos", "Segunda versión"),
        ];
        assert_eq!(writer().add_documents(&store, &batch), 2);
        assert_eq!(
            writer().add_documents(&store, &[DocumentRecord::new("same", "Tres", "Tercera versión")]),
            1
        );

        let stored = store.stored("same").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content.as_deref(), Some("Tercera versión"));
    }

    #[test]
    fn test_reject_policy_skips_known_ids() {
        let schema = create_schema_with(AnalyzerConfig::default(), DuplicatePolicy::Reject);
        let (store, events, _dir) = create_test_store(&schema);

        assert_eq!(writer().add_documents(&store, &records(2)), 2);

        let mut batch = records(3);
        batch.push(DocumentRecord::new("new", "Nuevo", "Documento nuevo"));
        batch.push(DocumentRecord::new("new", "Nuevo otra vez", "Repetido en el lote"));

        // doc-0 and doc-1 are committed, the second "new" repeats within the batch
        assert_eq!(writer().add_documents(&store, &batch), 2);
        assert_eq!(store.doc_count(), 4);

        let rejected = events
            .events()
            .into_iter()
            .filter(|event| matches!(event, IndexEvent::RecordRejected { .. }))
            .count();
        assert_eq!(rejected, 3);
    }

    #[test]
    fn test_reject_policy_sees_commits_from_other_handles() {
        let schema = create_schema_with(AnalyzerConfig::default(), DuplicatePolicy::Reject);
        let (first, _events, dir) = create_test_store(&schema);
        let second = IndexStore::open_or_create(dir.path(), &schema).unwrap();
        let record = DocumentRecord::new("x", "Título", "Contenido");

        assert_eq!(writer().add_documents(&second, &[record.clone()]), 1);
        assert_eq!(writer().add_documents(&first, &[record]), 0);

        assert_eq!(first.count_exact(FieldName::DocId, "x").unwrap(), 1);
    }

    #[test]
    fn test_writer_events_override_store_events() {
        let (store, store_events, _dir) = create_test_store(&create_schema());
        let batch_events = Arc::new(RecordingEvents::default());

        writer()
            .with_events(batch_events.clone())
            .add_documents(&store, &records(1));

        assert_eq!(
            batch_events.events().first(),
            Some(&IndexEvent::BatchStarted { total: 1 })
        );
        assert!(!store_events
            .events()
            .iter()
            .any(|event| matches!(event, IndexEvent::BatchStarted { .. })));
    }
}
