use super::naming;
use super::tracker::{self, UploadTracker};
use crate::services::error::{ErrorCode, ServiceError, ServiceResult};
use crate::services::storage::{MIN_COMPOSE_PART_SIZE, ObjectStore, StorageError, StorageResult};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Concurrent deletes issued while sweeping a prefix.
const CLEANUP_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct FailedRemoval {
    pub key: String,
    pub reason: String,
}

/// Outcome of deleting everything under a prefix. Individual failures are
/// collected, never raised.
#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failed: Vec<FailedRemoval>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Turns a session's chunks into one object with a server-side compose.
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn ObjectStore>,
    tracker: UploadTracker,
    min_part_size: u64,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn ObjectStore>, tracker: UploadTracker) -> Self {
        Self {
            store,
            tracker,
            min_part_size: MIN_COMPOSE_PART_SIZE,
        }
    }

    /// Composes chunks `0..total_chunks` of the session into `dest_key` and
    /// returns the size of the merged object.
    ///
    /// Nothing is composed unless chunk 0 meets the part minimum and every
    /// index is present.
    pub async fn merge(
        &self,
        bucket: &str,
        upload_session_id: &str,
        file_digest: &str,
        total_chunks: u32,
        dest_key: &str,
    ) -> ServiceResult<u64> {
        let first = naming::chunk_key(upload_session_id, file_digest, 0);
        let first_size = match self.store.stat_object(bucket, &first).await {
            Ok(size) => size,
            Err(StorageError::NotFound { .. }) => {
                return Err(ServiceError::NotFound(format!(
                    "No chunks found for session '{}' and file '{}'",
                    upload_session_id, file_digest
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if first_size < self.min_part_size {
            return Err(ServiceError::invalid(
                ErrorCode::ChunkTooSmall,
                format!(
                    "Chunk 0 is {} bytes; chunks must be at least {} bytes to be merged",
                    first_size, self.min_part_size
                ),
            ));
        }

        let uploaded = self
            .tracker
            .list_uploaded_chunks(bucket, upload_session_id, file_digest)
            .await?;
        if !tracker::is_complete(&uploaded, total_chunks) {
            let missing = tracker::missing_chunks(&uploaded, total_chunks);
            return Err(ServiceError::invalid(
                ErrorCode::IncompleteUpload,
                format!("Missing chunks {:?} of {}", missing, total_chunks),
            ));
        }

        let sources: Vec<String> = (0..total_chunks)
            .map(|i| naming::chunk_key(upload_session_id, file_digest, i))
            .collect();

        let size = self.store.compose_object(bucket, dest_key, &sources).await?;
        tracing::info!(
            "Composed {} chunks of session {} into {}/{} ({} bytes)",
            total_chunks,
            upload_session_id,
            bucket,
            dest_key,
            size
        );
        Ok(size)
    }

    /// Deletes every object under `prefix`. Only the listing can fail the call.
    pub async fn cleanup_prefix(&self, bucket: &str, prefix: &str) -> StorageResult<CleanupReport> {
        let keys = self.store.list_objects(bucket, prefix, true).await?;

        let results: Vec<(String, StorageResult<()>)> = futures::stream::iter(keys)
            .map(|key| async move {
                let result = self.store.remove_object(bucket, &key).await;
                (key, result)
            })
            .buffer_unordered(CLEANUP_CONCURRENCY)
            .collect()
            .await;

        let mut report = CleanupReport::default();
        for (key, result) in results {
            match result {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!("Failed to remove temporary object {}/{}: {}", bucket, key, e);
                    report.failed.push(FailedRemoval {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.failed.sort_by(|a, b| a.key.cmp(&b.key));
        tracing::debug!(
            "Cleaned up {}/{}: {} deleted, {} failed",
            bucket,
            prefix,
            report.deleted,
            report.failed.len()
        );
        Ok(report)
    }
}
