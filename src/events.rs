//! Telemetry hooks for the store and the batch writer
//!
//! Components take an `Arc<dyn IndexEvents>` at construction instead of
//! logging through a module-level logger. [`LogEvents`] forwards to the `log`
//! facade and is the default everywhere.

use std::path::PathBuf;

/// Something observable that happened while opening or writing an index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    DirectoryCreated { location: PathBuf },
    IndexCreated { location: PathBuf },
    IndexOpened { location: PathBuf },
    StorageFailed { location: PathBuf, error: String },
    EmptyBatch,
    BatchStarted { total: usize },
    RecordRejected { id: String, error: String },
    BatchCommitted { succeeded: usize, total: usize, opstamp: u64 },
    BatchAborted { error: String },
    TransactionDiscarded { appended: usize },
}

pub trait IndexEvents: Send + Sync {
    fn emit(&self, event: IndexEvent);
}

/// Default sink writing every event to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl IndexEvents for LogEvents {
    fn emit(&self, event: IndexEvent) {
        match event {
            IndexEvent::DirectoryCreated { location } => {
                log::info!("Index directory {:?} did not exist, created it", location);
            }
            IndexEvent::IndexCreated { location } => {
                log::info!("No index found at {:?}, created a new one", location);
            }
            IndexEvent::IndexOpened { location } => {
                log::info!("Opened existing index at {:?}", location);
            }
            IndexEvent::StorageFailed { location, error } => {
                log::error!("Failed to initialize index at {:?}: {}", location, error);
            }
            IndexEvent::EmptyBatch => {
                log::warn!("add_documents called with an empty batch, nothing to do");
            }
            IndexEvent::BatchStarted { total } => {
                log::info!("Indexing batch of {} documents", total);
            }
            IndexEvent::RecordRejected { id, error } => {
                log::error!("Skipping document {}: {}", id, error);
            }
            IndexEvent::BatchCommitted {
                succeeded,
                total,
                opstamp,
            } => {
                log::info!(
                    "Batch committed at opstamp {}: indexed {}/{}",
                    opstamp,
                    succeeded,
                    total
                );
            }
            IndexEvent::BatchAborted { error } => {
                log::error!("Batch aborted, nothing committed: {}", error);
            }
            IndexEvent::TransactionDiscarded { appended } => {
                log::warn!(
                    "Write transaction closed without commit, discarded {} documents",
                    appended
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Sink that keeps every event for assertions
    #[derive(Default)]
    pub struct RecordingEvents {
        events: Mutex<Vec<IndexEvent>>,
    }

    impl RecordingEvents {
        pub fn events(&self) -> Vec<IndexEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl IndexEvents for RecordingEvents {
        fn emit(&self, event: IndexEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
