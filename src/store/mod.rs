//! Durable storage for call records.
//!
//! # Data Flow
//! ```text
//! TrackingCoordinator::submit(record)
//!     → TrackingStore::insert_record
//!         → file.rs   (one JSON document per call)
//!         → log.rs    (one structured tracing event per call)
//!         → memory.rs (in-process map, for tests and embedding)
//! ```
//!
//! # Design Decisions
//! - The store owns a record once it has been submitted
//! - Stores are called concurrently for distinct calls; no ordering between calls
//! - Failed writes are reported, never retried

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{StoreConfig, StoreKind};
use crate::tracking::CallRecord;

pub mod file;
pub mod log;
pub mod memory;

pub use file::FileStore;
pub use log::LogStore;
pub use memory::MemoryStore;

/// Errors returned by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("record {0} is already stored")]
    Duplicate(Uuid),
}

/// Persists finished call records.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Persist one finished record.
    async fn insert_record(&self, record: CallRecord) -> Result<(), StoreError>;
}

/// Build the store selected by configuration.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn TrackingStore>, StoreError> {
    let store: Arc<dyn TrackingStore> = match config.kind {
        StoreKind::File => Arc::new(FileStore::open(&config.directory).await?),
        StoreKind::Log => Arc::new(LogStore::new()),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };

    tracing::info!(kind = ?config.kind, "Tracking store ready");
    Ok(store)
}
