use super::naming;
use crate::services::storage::{ObjectStore, StorageResult};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Reconstructs upload progress from what is stored under the chunk prefix.
/// There is no session record: the listing is the state.
#[derive(Clone)]
pub struct UploadTracker {
    store: Arc<dyn ObjectStore>,
}

impl UploadTracker {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Indices stored for one file of one session.
    pub async fn list_uploaded_chunks(
        &self,
        bucket: &str,
        upload_session_id: &str,
        file_digest: &str,
    ) -> StorageResult<BTreeSet<u32>> {
        let prefix = naming::chunk_dir(upload_session_id, file_digest);
        let keys = self.store.list_objects(bucket, &prefix, true).await?;
        Ok(collect_chunk_indices(keys.iter().map(String::as_str).filter(
            |key| {
                key.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| !rest.contains('/'))
            },
        )))
    }

    /// Indices stored for `file_digest` across every session.
    pub async fn list_uploaded_chunks_for_digest(
        &self,
        bucket: &str,
        file_digest: &str,
    ) -> StorageResult<BTreeSet<u32>> {
        let keys = self
            .store
            .list_objects(bucket, naming::CHUNK_UPLOAD_PREFIX, true)
            .await?;

        Ok(collect_chunk_indices(
            keys.iter()
                .map(String::as_str)
                .filter(|key| naming::digest_of_chunk_key(key) == Some(file_digest)),
        ))
    }
}

/// Parses chunk indices out of object keys. Keys that are not chunks are
/// ignored; chunk keys with a non-numeric index are logged and skipped.
pub fn collect_chunk_indices<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeSet<u32> {
    let mut indices = BTreeSet::new();
    for key in keys {
        let Some(component) = naming::chunk_index_component(key) else {
            continue;
        };
        match component.parse::<u32>() {
            Ok(index) => {
                indices.insert(index);
            }
            Err(_) => tracing::warn!("Skipping malformed chunk key: {}", key),
        }
    }
    indices
}

/// True when every index in `0..total_chunks` is present.
pub fn is_complete(uploaded: &BTreeSet<u32>, total_chunks: u32) -> bool {
    total_chunks > 0 && (0..total_chunks).all(|i| uploaded.contains(&i))
}

pub fn missing_chunks(uploaded: &BTreeSet<u32>, total_chunks: u32) -> Vec<u32> {
    (0..total_chunks).filter(|i| !uploaded.contains(i)).collect()
}
