//! Store gateway: the narrow boundary between the pipeline and durable storage.

use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::types::Record;

/// Persists one record per call.
///
/// Shared by every dispatch worker, so implementations synchronise
/// internally. No retries: a failed call is reported once and forgotten.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn store(&self, record: &Record) -> Result<(), PersistenceError>;
}

/// A row held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: u64,
    pub record: Record,
    pub stored_at: SystemTime,
}

/// Append-only in-process store. Used for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Vec<StoredRow> {
        self.lock().clone()
    }

    // A poisoned lock only means another caller panicked mid-push; the
    // vector itself is still consistent.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredRow>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn store(&self, record: &Record) -> Result<(), PersistenceError> {
        let mut rows = self.lock();
        let id = rows.len() as u64 + 1;
        rows.push(StoredRow {
            id,
            record: record.clone(),
            stored_at: SystemTime::now(),
        });
        Ok(())
    }
}
