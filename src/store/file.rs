//! One JSON document per call, named after its tracking id.
//!
//! A record is written to `<id>.json.tmp` first and linked to `<id>.json`
//! once complete, so the final name never refers to a partial document.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::store::{StoreError, TrackingStore};
use crate::tracking::CallRecord;

/// Writes `<directory>/<tracking-id>.json` for every call.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `directory`, creating it if needed.
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, tracking_id: Uuid) -> PathBuf {
        self.directory.join(format!("{}.json", tracking_id.hyphenated()))
    }

    fn staging_path_for(&self, tracking_id: Uuid) -> PathBuf {
        self.directory.join(format!("{}.json.tmp", tracking_id.hyphenated()))
    }

    /// Read a stored record back.
    pub async fn load(&self, tracking_id: Uuid) -> Result<CallRecord, StoreError> {
        let bytes = fs::read(self.path_for(tracking_id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TrackingStore for FileStore {
    async fn insert_record(&self, record: CallRecord) -> Result<(), StoreError> {
        let tracking_id = record.tracking_id();
        let path = self.path_for(tracking_id);
        let json = serde_json::to_vec_pretty(&record)?;

        let staging = self.staging_path_for(tracking_id);
        // An existing staging file means the same record is already being inserted.
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .await
            .map_err(|e| duplicate_or_io(e, tracking_id))?;

        let published = publish(file, &json, &staging, &path).await;
        if let Err(e) = fs::remove_file(&staging).await {
            tracing::warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
        }
        published.map_err(|e| duplicate_or_io(e, tracking_id))?;

        tracing::info!(
            tracking_id = %tracking_id,
            path = %path.display(),
            verb = %record.verb,
            uri = %record.request_uri,
            status = record.status_code,
            request_length = record.request_length,
            response_length = record.response_length,
            "Call record saved"
        );
        Ok(())
    }
}

/// Write the whole document to the staging file, then give it its final
/// name. Linking fails if the final name is taken.
async fn publish(mut file: fs::File, json: &[u8], staging: &Path, path: &Path) -> io::Result<()> {
    file.write_all(json).await?;
    file.sync_all().await?;
    drop(file);
    fs::hard_link(staging, path).await
}

fn duplicate_or_io(e: io::Error, tracking_id: Uuid) -> StoreError {
    match e.kind() {
        ErrorKind::AlreadyExists => StoreError::Duplicate(tracking_id),
        _ => StoreError::Io(e),
    }
}
