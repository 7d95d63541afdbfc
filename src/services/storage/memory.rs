use super::{ByteRange, MIN_COMPOSE_PART_SIZE, ObjectStore, StorageError, StorageResult};
use anyhow::anyhow;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    objects: BTreeMap<String, StoredObject>,
    policy: Option<String>,
}

/// Process-local object store.
///
/// Used for `STORAGE_BACKEND=memory` and in tests. It applies the same compose
/// rule as MinIO: every source but the last must be at least 5 MiB.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<HashMap<String, MemoryBucket>>,
    compose_calls: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with empty buckets.
    pub fn with_buckets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = names
            .into_iter()
            .map(|name| (name.into(), MemoryBucket::default()))
            .collect();
        Self {
            buckets: RwLock::new(buckets),
            compose_calls: AtomicUsize::new(0),
        }
    }

    /// Content type recorded for an object, if it exists.
    pub async fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.content_type.clone())
    }

    /// Number of compose requests received, successful or not.
    pub fn compose_calls(&self) -> usize {
        self.compose_calls.load(Ordering::SeqCst)
    }
}

fn bucket_not_found(bucket: &str) -> StorageError {
    StorageError::BucketNotFound(bucket.to_string())
}

fn object_not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(StorageError::Backend(anyhow!(
                "BucketAlreadyOwnedByYou: {}",
                bucket
            )));
        }
        buckets.insert(bucket.to_string(), MemoryBucket::default());
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        match buckets.get(bucket) {
            None => Err(bucket_not_found(bucket)),
            Some(b) if !b.objects.is_empty() => {
                Err(StorageError::Backend(anyhow!("BucketNotEmpty: {}", bucket)))
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        let b = buckets.get_mut(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        b.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StorageResult<Bytes> {
        let buckets = self.buckets.read().await;
        let b = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        let object = b
            .objects
            .get(key)
            .ok_or_else(|| object_not_found(bucket, key))?;

        let Some(range) = range else {
            return Ok(object.data.clone());
        };

        let size = object.data.len() as u64;
        if range.offset > size {
            return Err(StorageError::Backend(anyhow!(
                "InvalidRange: offset {} beyond size {}",
                range.offset,
                size
            )));
        }
        let end = match range.length {
            Some(len) if len > 0 => (range.offset + len).min(size),
            _ => size,
        };
        Ok(object.data.slice(range.offset as usize..end as usize))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        let b = buckets.get_mut(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        b.objects.remove(key);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> StorageResult<Vec<String>> {
        let buckets = self.buckets.read().await;
        let b = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;

        let matching = b
            .objects
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix));

        if recursive {
            return Ok(matching.cloned().collect());
        }

        // Collapse deeper keys into their first-level "directory".
        let mut entries = BTreeSet::new();
        for key in matching {
            let rest = &key[prefix.len()..];
            match rest.find('/') {
                Some(idx) => entries.insert(format!("{}{}", prefix, &rest[..=idx])),
                None => entries.insert(key.clone()),
            };
        }
        Ok(entries.into_iter().collect())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        let buckets = self.buckets.read().await;
        let b = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        b.objects
            .get(key)
            .map(|o| o.data.len() as u64)
            .ok_or_else(|| object_not_found(bucket, key))
    }

    async fn compose_object(
        &self,
        bucket: &str,
        dest_key: &str,
        sources: &[String],
    ) -> StorageResult<u64> {
        self.compose_calls.fetch_add(1, Ordering::SeqCst);

        if sources.is_empty() {
            return Err(StorageError::Backend(anyhow!(
                "Compose requires at least one source"
            )));
        }

        let mut buckets = self.buckets.write().await;
        let b = buckets.get_mut(bucket).ok_or_else(|| bucket_not_found(bucket))?;

        let mut composed = BytesMut::new();
        for (i, source) in sources.iter().enumerate() {
            let object = b
                .objects
                .get(source)
                .ok_or_else(|| object_not_found(bucket, source))?;
            let is_last = i + 1 == sources.len();
            if !is_last && (object.data.len() as u64) < MIN_COMPOSE_PART_SIZE {
                return Err(StorageError::Backend(anyhow!(
                    "EntityTooSmall: source {} is {} bytes, minimum part size is {}",
                    source,
                    object.data.len(),
                    MIN_COMPOSE_PART_SIZE
                )));
            }
            composed.extend_from_slice(&object.data);
        }

        let size = composed.len() as u64;
        b.objects.insert(
            dest_key.to_string(),
            StoredObject {
                data: composed.freeze(),
                content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            },
        );
        Ok(size)
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        let mut buckets = self.buckets.write().await;
        let b = buckets.get_mut(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        b.policy = Some(policy.to_string());
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> StorageResult<String> {
        let buckets = self.buckets.read().await;
        let b = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        b.policy
            .clone()
            .ok_or_else(|| StorageError::NoPolicy(bucket.to_string()))
    }
}
