use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use rust_oss_backend::config::OssConfig;
use rust_oss_backend::services::chunk_upload::{
    ChunkUploadLookup, ChunkUploadService, CompleteChunkUploadRequest, InitChunkUploadRequest,
    naming,
};
use rust_oss_backend::services::error::{ErrorCode, ServiceError};
use rust_oss_backend::services::storage::{
    ByteRange, InMemoryObjectStore, MIN_COMPOSE_PART_SIZE, ObjectStore, StorageError,
    StorageResult,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const MIB: usize = 1024 * 1024;
const BUCKET: &str = "public";

fn setup() -> (Arc<InMemoryObjectStore>, ChunkUploadService) {
    let store = Arc::new(InMemoryObjectStore::with_buckets([BUCKET]));
    let service = ChunkUploadService::new(store.clone(), OssConfig::development());
    (store, service)
}

/// Deterministic file content so every chunk differs.
fn file_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn chunks(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    data.chunks(chunk_size).map(Bytes::copy_from_slice).collect()
}

fn lookup(file_md5: &str, session: Option<&str>) -> ChunkUploadLookup {
    ChunkUploadLookup {
        file_md5: file_md5.to_string(),
        bucket_name: None,
        upload_session_id: session.map(str::to_string),
    }
}

async fn final_objects(store: &InMemoryObjectStore) -> Vec<String> {
    store
        .list_objects(BUCKET, "", true)
        .await
        .unwrap()
        .into_iter()
        .filter(|k| !k.starts_with(naming::CHUNK_UPLOAD_PREFIX))
        .collect()
}

#[tokio::test]
async fn test_total_chunks_and_minimum_chunk_size() {
    let (_, service) = setup();

    for (total_size, chunk_size, expected) in [
        (12_000_000u64, 5_242_880u64, 3u32),
        (5_242_880, 5_242_880, 1),
        (5_242_881, 5_242_880, 2),
        (100 * MIB as u64, 10 * MIB as u64, 10),
    ] {
        let status = service
            .init_session(&InitChunkUploadRequest {
                file_name: "movie.mkv".to_string(),
                file_md5: "abc".to_string(),
                total_size,
                chunk_size,
                upload_session_id: "s-init".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(status.total_chunks, expected);
    }

    let err = service
        .init_session(&InitChunkUploadRequest {
            file_name: "movie.mkv".to_string(),
            file_md5: "abc".to_string(),
            total_size: 12_000_000,
            chunk_size: 4 * MIB as u64,
            upload_session_id: "s-init".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ChunkTooSmall));
}

#[tokio::test]
async fn test_partial_upload_lists_exact_indices() {
    let (_, service) = setup();
    let part = Bytes::from(vec![1u8; MIN_COMPOSE_PART_SIZE as usize]);

    for index in [5u32, 0, 2] {
        service
            .put_chunk(None, "s-partial", "abc", index, 6, part.clone())
            .await
            .unwrap();
    }

    let status = service
        .init_session(&InitChunkUploadRequest {
            file_name: "data.bin".to_string(),
            file_md5: "abc".to_string(),
            total_size: 6 * MIN_COMPOSE_PART_SIZE,
            chunk_size: MIN_COMPOSE_PART_SIZE,
            upload_session_id: "s-partial".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(status.total_chunks, 6);
    assert_eq!(status.uploaded_chunks, vec![0, 2, 5]);
    assert!(!status.is_completed);
}

#[tokio::test]
async fn test_retried_chunk_is_stored_once() {
    let (store, service) = setup();
    let first = Bytes::from(vec![1u8; MIN_COMPOSE_PART_SIZE as usize]);
    let retry = Bytes::from(vec![2u8; MIN_COMPOSE_PART_SIZE as usize]);

    service
        .put_chunk(None, "s-retry", "abc", 3, 6, first)
        .await
        .unwrap();
    service
        .put_chunk(None, "s-retry", "abc", 3, 6, retry)
        .await
        .unwrap();

    let keys = store
        .list_objects(BUCKET, &naming::chunk_dir("s-retry", "abc"), true)
        .await
        .unwrap();
    assert_eq!(keys, vec![naming::chunk_key("s-retry", "abc", 3)]);

    let stored = store.get_object(BUCKET, &keys[0], None).await.unwrap();
    assert!(stored.iter().all(|b| *b == 2));

    let status = service
        .status(&lookup("abc", Some("s-retry")))
        .await
        .unwrap();
    assert_eq!(status.uploaded_chunks, vec![3]);
}

#[tokio::test]
async fn test_complete_concatenates_in_index_order_and_cleans_up() {
    let (store, service) = setup();
    let data = file_bytes(2 * MIN_COMPOSE_PART_SIZE as usize + 1234);
    let md5 = digest(&data);
    let parts = chunks(&data, MIN_COMPOSE_PART_SIZE as usize);
    assert_eq!(parts.len(), 3);

    // Out of order on purpose.
    for index in [2usize, 0, 1] {
        service
            .put_chunk(Some("archive.zip"), "s-merge", &md5, index as u32, 3, parts[index].clone())
            .await
            .unwrap();
    }

    let completed = service
        .complete(&CompleteChunkUploadRequest {
            file_name: "archive.zip".to_string(),
            file_md5: md5.clone(),
            upload_session_id: "s-merge".to_string(),
            total_chunks: 3,
        })
        .await
        .unwrap();

    assert_eq!(completed.size, data.len() as u64);
    assert!(completed.object_key.ends_with(".zip"));
    assert_eq!(
        completed.url,
        format!("http://localhost:9000/{}/{}", BUCKET, completed.object_key)
    );

    let merged = store
        .get_object(BUCKET, &completed.object_key, None)
        .await
        .unwrap();
    assert_eq!(digest(&merged), md5);

    let leftovers = store
        .list_objects(BUCKET, &naming::session_prefix("s-merge"), true)
        .await
        .unwrap();
    assert!(leftovers.is_empty());
    assert_eq!(final_objects(&store).await, vec![completed.object_key]);
}

#[tokio::test]
async fn test_complete_with_small_first_chunk_never_composes() {
    let (store, service) = setup();

    // A single short chunk is a valid last chunk, but cannot be merged.
    service
        .put_chunk(None, "s-small", "abc", 0, 1, Bytes::from_static(b"tiny"))
        .await
        .unwrap();

    let err = service
        .complete(&CompleteChunkUploadRequest {
            file_name: "tiny.txt".to_string(),
            file_md5: "abc".to_string(),
            upload_session_id: "s-small".to_string(),
            total_chunks: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InvalidArgument { .. }));
    assert_eq!(err.code(), Some(ErrorCode::ChunkTooSmall));
    assert_eq!(store.compose_calls(), 0);
    assert!(final_objects(&store).await.is_empty());
}

#[tokio::test]
async fn test_complete_with_missing_chunk_never_composes() {
    let (store, service) = setup();
    let part = Bytes::from(vec![3u8; MIN_COMPOSE_PART_SIZE as usize]);
    service
        .put_chunk(None, "s-gap", "abc", 0, 3, part.clone())
        .await
        .unwrap();
    service
        .put_chunk(None, "s-gap", "abc", 2, 3, Bytes::from_static(b"end"))
        .await
        .unwrap();

    let err = service
        .complete(&CompleteChunkUploadRequest {
            file_name: "gap.bin".to_string(),
            file_md5: "abc".to_string(),
            upload_session_id: "s-gap".to_string(),
            total_chunks: 3,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::IncompleteUpload));
    assert_eq!(store.compose_calls(), 0);

    // Chunks survive a failed completion so the client can fill the gap.
    let status = service.status(&lookup("abc", Some("s-gap"))).await.unwrap();
    assert_eq!(status.uploaded_chunks, vec![0, 2]);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (_, service) = setup();
    let part = Bytes::from(vec![1u8; MIN_COMPOSE_PART_SIZE as usize]);
    for index in 0..3u32 {
        service
            .put_chunk(None, "s-cancel", "abc", index, 4, part.clone())
            .await
            .unwrap();
    }

    let report = service.cancel(&lookup("abc", Some("s-cancel"))).await.unwrap();
    assert_eq!(report.deleted, 3);
    assert!(report.failed.is_empty());

    let status = service
        .status(&lookup("abc", Some("s-cancel")))
        .await
        .unwrap();
    assert!(status.uploaded_chunks.is_empty());

    let again = service.cancel(&lookup("abc", Some("s-cancel"))).await.unwrap();
    assert_eq!(again.deleted, 0);
}

#[tokio::test]
async fn test_cancel_without_session_sweeps_digest_prefix() {
    let (store, service) = setup();
    let stray = format!("{}0.part", naming::digest_sweep_prefix("abc"));
    store
        .put_object(BUCKET, &stray, Bytes::from_static(b"x"), "application/octet-stream")
        .await
        .unwrap();
    service
        .put_chunk(None, "s-keep", "abc", 0, 1, Bytes::from_static(b"x"))
        .await
        .unwrap();

    let report = service.cancel(&lookup("abc", Some("  "))).await.unwrap();
    assert_eq!(report.deleted, 1);

    // Session-scoped chunks are outside the digest prefix.
    let status = service.status(&lookup("abc", Some("s-keep"))).await.unwrap();
    assert_eq!(status.uploaded_chunks, vec![0]);
}

#[tokio::test]
async fn test_status_without_session_spans_sessions() {
    let (_, service) = setup();
    let part = Bytes::from(vec![1u8; MIN_COMPOSE_PART_SIZE as usize]);
    service
        .put_chunk(None, "s-a", "abc", 0, 3, part.clone())
        .await
        .unwrap();
    service
        .put_chunk(None, "s-b", "abc", 1, 3, part.clone())
        .await
        .unwrap();
    service
        .put_chunk(None, "s-b", "other", 2, 3, Bytes::from_static(b"x"))
        .await
        .unwrap();

    let status = service.status(&lookup("abc", None)).await.unwrap();
    assert_eq!(status.uploaded_chunks, vec![0, 1]);
    assert_eq!(status.total_chunks, 2);
    assert!(status.is_completed);
}

#[tokio::test]
async fn test_report_pdf_scenario() {
    let (store, service) = setup();
    let data = file_bytes(12_000_000);
    let md5 = digest(&data);
    let session = "upload-report-pdf";

    let status = service
        .init_session(&InitChunkUploadRequest {
            file_name: "report.pdf".to_string(),
            file_md5: md5.clone(),
            total_size: 12_000_000,
            chunk_size: 5_242_880,
            upload_session_id: session.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(status.total_chunks, 3);

    for (index, part) in chunks(&data, 5_242_880).into_iter().enumerate() {
        service
            .put_chunk(Some("report.pdf"), session, &md5, index as u32, 3, part)
            .await
            .unwrap();
    }

    let resumed = service
        .init_session(&InitChunkUploadRequest {
            file_name: "report.pdf".to_string(),
            file_md5: md5.clone(),
            total_size: 12_000_000,
            chunk_size: 5_242_880,
            upload_session_id: session.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(resumed.uploaded_chunks, vec![0, 1, 2]);
    assert!(resumed.is_completed);

    let completed = service
        .complete(&CompleteChunkUploadRequest {
            file_name: "report.pdf".to_string(),
            file_md5: md5.clone(),
            upload_session_id: session.to_string(),
            total_chunks: 3,
        })
        .await
        .unwrap();

    let segments: Vec<&str> = completed.object_key.split('/').collect();
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[0].len(), 4);
    assert_eq!(segments[1].len(), 2);
    assert_eq!(segments[2].len(), 2);
    assert!(segments[..3].iter().all(|s| s.chars().all(|c| c.is_ascii_digit())));
    let stem = segments[3].strip_suffix(".pdf").unwrap();
    assert_eq!(stem.len(), 32);
    assert!(stem.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));

    let status = service.status(&lookup(&md5, Some(session))).await.unwrap();
    assert!(status.uploaded_chunks.is_empty());
    assert_eq!(
        store.stat_object(BUCKET, &completed.object_key).await.unwrap(),
        12_000_000
    );
}

#[tokio::test]
async fn test_racing_completes_create_one_object() {
    let (store, service) = setup();
    let service = Arc::new(service);
    let data = file_bytes(MIN_COMPOSE_PART_SIZE as usize + 10);
    let md5 = digest(&data);
    for (index, part) in chunks(&data, MIN_COMPOSE_PART_SIZE as usize).into_iter().enumerate() {
        service
            .put_chunk(None, "s-race", &md5, index as u32, 2, part)
            .await
            .unwrap();
    }

    let request = CompleteChunkUploadRequest {
        file_name: "race.bin".to_string(),
        file_md5: md5,
        upload_session_id: "s-race".to_string(),
        total_chunks: 2,
    };
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let request = request.clone();
            tokio::spawn(async move { service.complete(&request).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, ServiceError::NotFound(_)), "unexpected: {e}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(final_objects(&store).await.len(), 1);
    assert_eq!(store.compose_calls(), 1);
}

/// Store whose deletes fail for chunk 1, to exercise partial cleanup.
struct StickyChunkStore {
    inner: InMemoryObjectStore,
}

#[async_trait]
impl ObjectStore for StickyChunkStore {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        self.inner.bucket_exists(bucket).await
    }
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.inner.make_bucket(bucket).await
    }
    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.inner.remove_bucket(bucket).await
    }
    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        self.inner.list_buckets().await
    }
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.inner.put_object(bucket, key, data, content_type).await
    }
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StorageResult<Bytes> {
        self.inner.get_object(bucket, key, range).await
    }
    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        if key.ends_with("/1.part") {
            return Err(StorageError::Backend(anyhow!("AccessDenied")));
        }
        self.inner.remove_object(bucket, key).await
    }
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> StorageResult<Vec<String>> {
        self.inner.list_objects(bucket, prefix, recursive).await
    }
    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        self.inner.stat_object(bucket, key).await
    }
    async fn compose_object(
        &self,
        bucket: &str,
        dest_key: &str,
        sources: &[String],
    ) -> StorageResult<u64> {
        self.inner.compose_object(bucket, dest_key, sources).await
    }
    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        self.inner.set_bucket_policy(bucket, policy).await
    }
    async fn get_bucket_policy(&self, bucket: &str) -> StorageResult<String> {
        self.inner.get_bucket_policy(bucket).await
    }
}

#[tokio::test]
async fn test_cleanup_failures_do_not_fail_complete() {
    let store = Arc::new(StickyChunkStore {
        inner: InMemoryObjectStore::with_buckets([BUCKET]),
    });
    let service = ChunkUploadService::new(store.clone(), OssConfig::development());
    let data = file_bytes(2 * MIN_COMPOSE_PART_SIZE as usize + 1);
    let md5 = digest(&data);
    for (index, part) in chunks(&data, MIN_COMPOSE_PART_SIZE as usize).into_iter().enumerate() {
        service
            .put_chunk(None, "s-sticky", &md5, index as u32, 3, part)
            .await
            .unwrap();
    }

    let completed = service
        .complete(&CompleteChunkUploadRequest {
            file_name: "sticky.bin".to_string(),
            file_md5: md5.clone(),
            upload_session_id: "s-sticky".to_string(),
            total_chunks: 3,
        })
        .await
        .unwrap();
    assert_eq!(completed.size, data.len() as u64);

    let left = store
        .list_objects(BUCKET, &naming::session_prefix("s-sticky"), true)
        .await
        .unwrap();
    assert_eq!(left, vec![naming::chunk_key("s-sticky", &md5, 1)]);

    let report = service.cancel(&lookup(&md5, Some("s-sticky"))).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, naming::chunk_key("s-sticky", &md5, 1));
}
