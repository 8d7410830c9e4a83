//! In-process store keyed by tracking id.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::store::{StoreError, TrackingStore};
use crate::tracking::CallRecord;

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, CallRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tracking_id: &Uuid) -> Option<CallRecord> {
        self.records.get(tracking_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of all records, in no particular order.
    pub fn records(&self) -> Vec<CallRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn insert_record(&self, record: CallRecord) -> Result<(), StoreError> {
        match self.records.entry(record.tracking_id()) {
            Entry::Occupied(entry) => Err(StoreError::Duplicate(*entry.key())),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }
}
