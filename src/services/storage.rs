use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;
pub mod s3;

pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

/// Every compose source except the last must be at least this large (5 MiB).
pub const MIN_COMPOSE_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket has no policy: {0}")]
    NoPolicy(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Byte window of an object read. `length == None` reads to the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// HTTP `Range` header value. A zero length is treated as open-ended.
    pub fn to_header(&self) -> String {
        match self.length {
            Some(len) if len > 0 => {
                format!("bytes={}-{}", self.offset, self.offset + len - 1)
            }
            _ => format!("bytes={}-", self.offset),
        }
    }
}

/// The object store the service fronts.
///
/// Calls are independent; there are no transactions across them.
/// `remove_object` succeeds for keys that do not exist.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;
    async fn make_bucket(&self, bucket: &str) -> StorageResult<()>;
    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()>;
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StorageResult<Bytes>;
    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Keys under `prefix`. Non-recursive listings also return the immediate
    /// "directories" (common prefixes, ending in `/`).
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> StorageResult<Vec<String>>;

    /// Size of the object in bytes.
    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<u64>;

    /// Concatenates `sources` (same bucket, in the given order) into `dest_key`
    /// server-side and returns the size of the result.
    async fn compose_object(
        &self,
        bucket: &str,
        dest_key: &str,
        sources: &[String],
    ) -> StorageResult<u64>;

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()>;
    async fn get_bucket_policy(&self, bucket: &str) -> StorageResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(ByteRange::new(0, Some(10)).to_header(), "bytes=0-9");
        assert_eq!(ByteRange::new(100, None).to_header(), "bytes=100-");
        assert_eq!(ByteRange::new(5, Some(0)).to_header(), "bytes=5-");
    }
}
