//! Resumable chunked uploads.
//!
//! A client announces a file (`init_session`), sends its chunks in any order
//! (`put_chunk`), and asks for them to be merged (`complete`). Progress is never
//! recorded separately: every call re-derives it by listing the chunk prefix.
//! Chunks are staged in the configured default bucket and the merged file is
//! written next to them.

pub mod merge;
pub mod naming;
pub mod tracker;
pub mod types;

pub use merge::{CleanupReport, FailedRemoval, MergeEngine};
pub use tracker::UploadTracker;
pub use types::*;

use crate::config::OssConfig;
use crate::services::error::{ErrorCode, ServiceError, ServiceResult};
use crate::services::storage::{MIN_COMPOSE_PART_SIZE, ObjectStore};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::{require_extension, require_key_segment};
use bytes::Bytes;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ChunkUploadService {
    store: Arc<dyn ObjectStore>,
    tracker: UploadTracker,
    merger: MergeEngine,
    config: OssConfig,
    completion_gate: KeyedMutex,
}

impl ChunkUploadService {
    pub fn new(store: Arc<dyn ObjectStore>, config: OssConfig) -> Self {
        let tracker = UploadTracker::new(store.clone());
        let merger = MergeEngine::new(store.clone(), tracker.clone());
        Self {
            store,
            tracker,
            merger,
            config,
            completion_gate: KeyedMutex::new(),
        }
    }

    fn staging_bucket(&self) -> &str {
        &self.config.default_bucket
    }

    /// Validates the announced file and reports which chunks are already
    /// stored. Read-only, so clients call it again to resume.
    pub async fn init_session(&self, req: &InitChunkUploadRequest) -> ServiceResult<ChunkUploadStatus> {
        require_extension(&req.file_name)?;
        require_key_segment(&req.upload_session_id, "upload_session_id")?;
        require_key_segment(&req.file_md5, "file_md5")?;
        if req.total_size == 0 {
            return Err(ServiceError::invalid(
                ErrorCode::InvalidParameter,
                "total_size must be greater than zero",
            ));
        }
        if req.chunk_size < MIN_COMPOSE_PART_SIZE {
            tracing::warn!(
                "Rejected chunk size {} below minimum {}",
                req.chunk_size,
                MIN_COMPOSE_PART_SIZE
            );
            return Err(ServiceError::invalid(
                ErrorCode::ChunkTooSmall,
                format!(
                    "chunk_size {} is below the minimum of {} bytes",
                    req.chunk_size, MIN_COMPOSE_PART_SIZE
                ),
            ));
        }

        let total_chunks = naming::total_chunks(req.total_size, req.chunk_size)?;
        let uploaded = self
            .tracker
            .list_uploaded_chunks(self.staging_bucket(), &req.upload_session_id, &req.file_md5)
            .await?;

        tracing::info!(
            "Chunk upload init: file={}, md5={}, session={}, chunks={}/{}",
            req.file_name,
            req.file_md5,
            req.upload_session_id,
            uploaded.len(),
            total_chunks
        );

        Ok(ChunkUploadStatus {
            file_name: Some(req.file_name.clone()),
            file_md5: req.file_md5.clone(),
            total_size: Some(req.total_size),
            chunk_size: Some(req.chunk_size),
            total_chunks,
            is_completed: tracker::is_complete(&uploaded, total_chunks),
            uploaded_chunks: uploaded.into_iter().collect(),
        })
    }

    /// Stores one chunk, overwriting any earlier upload of the same index.
    /// Every chunk but the last must be at least 5 MiB or it could never be
    /// composed.
    pub async fn put_chunk(
        &self,
        file_name: Option<&str>,
        upload_session_id: &str,
        file_md5: &str,
        chunk_index: u32,
        total_chunks: u32,
        data: Bytes,
    ) -> ServiceResult<UploadChunkResponse> {
        if data.is_empty() {
            return Err(ServiceError::invalid(ErrorCode::EmptyFile, "Chunk payload is empty"));
        }
        require_key_segment(upload_session_id, "upload_session_id")?;
        require_key_segment(file_md5, "file_md5")?;
        if total_chunks == 0 {
            return Err(ServiceError::invalid(
                ErrorCode::InvalidParameter,
                "total_chunks must be greater than zero",
            ));
        }
        if chunk_index >= total_chunks {
            return Err(ServiceError::invalid(
                ErrorCode::ChunkIndexOutOfRange,
                format!("Chunk index {} outside [0, {})", chunk_index, total_chunks),
            ));
        }
        let size = data.len() as u64;
        let is_last = chunk_index + 1 == total_chunks;
        if !is_last && size < MIN_COMPOSE_PART_SIZE {
            return Err(ServiceError::invalid(
                ErrorCode::ChunkTooSmall,
                format!(
                    "Chunk {} is {} bytes; only the last chunk may be smaller than {} bytes",
                    chunk_index, size, MIN_COMPOSE_PART_SIZE
                ),
            ));
        }

        let key = naming::chunk_key(upload_session_id, file_md5, chunk_index);
        self.store
            .put_object(
                self.staging_bucket(),
                &key,
                data,
                mime::APPLICATION_OCTET_STREAM.as_ref(),
            )
            .await?;

        tracing::info!(
            "Stored chunk {}/{} of {} (session {}, {} bytes)",
            chunk_index + 1,
            total_chunks,
            file_name.unwrap_or(file_md5),
            upload_session_id,
            size
        );

        Ok(UploadChunkResponse {
            upload_session_id: upload_session_id.to_string(),
            file_md5: file_md5.to_string(),
            chunk_index,
            size,
        })
    }

    /// Merges all chunks into a freshly named object and clears the session.
    ///
    /// Completions of one session are serialized in-process; the second caller
    /// finds the chunks gone and gets `NotFound`.
    pub async fn complete(&self, req: &CompleteChunkUploadRequest) -> ServiceResult<CompletedUpload> {
        require_key_segment(&req.upload_session_id, "upload_session_id")?;
        require_key_segment(&req.file_md5, "file_md5")?;
        let ext = require_extension(&req.file_name)?;
        if req.total_chunks == 0 {
            return Err(ServiceError::invalid(
                ErrorCode::InvalidParameter,
                "total_chunks must be greater than zero",
            ));
        }

        let bucket = self.staging_bucket().to_string();
        let object_key = naming::final_object_key(ext, Utc::now().date_naive());

        let gate_key = format!("{}/{}", bucket, req.upload_session_id);
        let _guard = self.completion_gate.lock(&gate_key).await;

        tracing::info!(
            "Merging chunks: file={}, md5={}, session={}, chunks={}, target={}/{}",
            req.file_name,
            req.file_md5,
            req.upload_session_id,
            req.total_chunks,
            bucket,
            object_key
        );

        let size = self
            .merger
            .merge(
                &bucket,
                &req.upload_session_id,
                &req.file_md5,
                req.total_chunks,
                &object_key,
            )
            .await?;

        // The merged object exists from here on; cleanup trouble is only logged.
        match self
            .merger
            .cleanup_prefix(&bucket, &naming::session_prefix(&req.upload_session_id))
            .await
        {
            Ok(report) if !report.is_clean() => tracing::warn!(
                "Session {} left {} temporary objects behind",
                req.upload_session_id,
                report.failed.len()
            ),
            Ok(report) => tracing::info!(
                "Removed {} temporary objects of session {}",
                report.deleted,
                req.upload_session_id
            ),
            Err(e) => tracing::error!(
                "Could not list session {} for cleanup: {}",
                req.upload_session_id,
                e
            ),
        }

        Ok(CompletedUpload {
            url: self.config.public_url(&bucket, &object_key),
            bucket,
            object_key,
            size,
        })
    }

    /// Chunks stored so far. Without a session id every session uploading
    /// the same digest is counted. The chunk count is inferred from the
    /// highest index seen.
    pub async fn status(&self, lookup: &ChunkUploadLookup) -> ServiceResult<ChunkUploadStatus> {
        require_key_segment(&lookup.file_md5, "file_md5")?;
        self.note_ignored_bucket(lookup.bucket_name.as_deref());
        let session = lookup_session(lookup)?;

        let bucket = self.staging_bucket();
        let uploaded: BTreeSet<u32> = match session {
            Some(session) => {
                self.tracker
                    .list_uploaded_chunks(bucket, session, &lookup.file_md5)
                    .await?
            }
            None => {
                self.tracker
                    .list_uploaded_chunks_for_digest(bucket, &lookup.file_md5)
                    .await?
            }
        };

        let total_chunks = uploaded.last().map(|max| max + 1).unwrap_or(0);

        Ok(ChunkUploadStatus {
            file_name: None,
            file_md5: lookup.file_md5.clone(),
            total_size: None,
            chunk_size: None,
            total_chunks,
            is_completed: tracker::is_complete(&uploaded, total_chunks),
            uploaded_chunks: uploaded.into_iter().collect(),
        })
    }

    /// Deletes the session's chunks, or with no session id everything under
    /// `.chunk-uploads/{file_md5}/`. Cancelling twice is fine.
    pub async fn cancel(&self, lookup: &ChunkUploadLookup) -> ServiceResult<CleanupReport> {
        require_key_segment(&lookup.file_md5, "file_md5")?;
        self.note_ignored_bucket(lookup.bucket_name.as_deref());
        let session = lookup_session(lookup)?;

        let prefix = match session {
            Some(session) => naming::session_prefix(session),
            None => naming::digest_sweep_prefix(&lookup.file_md5),
        };

        tracing::info!(
            "Cancelling chunk upload: md5={}, prefix={}",
            lookup.file_md5,
            prefix
        );
        let report = self.merger.cleanup_prefix(self.staging_bucket(), &prefix).await?;
        Ok(report)
    }

    fn note_ignored_bucket(&self, bucket_name: Option<&str>) {
        if let Some(requested) = non_blank(bucket_name) {
            if requested != self.staging_bucket() {
                tracing::debug!(
                    "Chunks are staged in {}, ignoring bucket {}",
                    self.staging_bucket(),
                    requested
                );
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// The lookup's session id when one is given, checked like any other key segment.
fn lookup_session(lookup: &ChunkUploadLookup) -> ServiceResult<Option<&str>> {
    non_blank(lookup.upload_session_id.as_deref())
        .map(|session| require_key_segment(session, "upload_session_id"))
        .transpose()
}
