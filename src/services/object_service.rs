use crate::config::OssConfig;
use crate::services::chunk_upload::naming;
use crate::services::error::{ErrorCode, ServiceError, ServiceResult};
use crate::services::storage::{ByteRange, ObjectStore};
use crate::utils::validation::{detect_content_type, require_extension, validate_file_size};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Listings never return more than this many entries.
pub const MAX_LIST_ENTRIES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UploadedObject {
    pub bucket: String,
    pub object_key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct DownloadedObject {
    /// Last path segment of the key.
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    pub offset: Option<u64>,
    pub length: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChunkCountQuery {
    /// Bytes per ranged read.
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ObjectChunkCount {
    pub size: u64,
    pub length: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
}

/// Single-shot uploads, downloads and range reads.
pub struct ObjectService {
    store: Arc<dyn ObjectStore>,
    config: OssConfig,
}

impl ObjectService {
    pub fn new(store: Arc<dyn ObjectStore>, config: OssConfig) -> Self {
        Self { store, config }
    }

    /// Stores `data` under a fresh date-bucketed key in `bucket` (or the default bucket).
    pub async fn upload(
        &self,
        bucket: Option<&str>,
        file_name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> ServiceResult<UploadedObject> {
        if data.is_empty() {
            return Err(ServiceError::invalid(ErrorCode::EmptyFile, "File is empty"));
        }
        let ext = require_extension(file_name)?;
        validate_file_size(data.len(), self.config.max_file_size)?;

        let bucket = self.config.resolve_bucket(bucket);
        let object_key = naming::final_object_key(ext, Utc::now().date_naive());
        let content_type = detect_content_type(content_type, &data);
        let size = data.len() as u64;

        tracing::info!(
            "Uploading {} ({} bytes, {}) to {}/{}",
            file_name,
            size,
            content_type,
            bucket,
            object_key
        );
        self.store
            .put_object(&bucket, &object_key, data, &content_type)
            .await?;

        Ok(UploadedObject {
            url: self.config.public_url(&bucket, &object_key),
            bucket,
            object_key,
            size,
            content_type,
        })
    }

    /// Reads a whole object, or `length` bytes from `offset` when a range is given.
    /// A range reaching past the end of the object is rejected.
    pub async fn download(
        &self,
        bucket: Option<&str>,
        key: &str,
        range: &RangeQuery,
    ) -> ServiceResult<DownloadedObject> {
        let bucket = self.config.resolve_bucket(bucket);
        let key = key.trim_start_matches('/');
        let file_name = key.rsplit('/').next().unwrap_or(key);
        if file_name.is_empty() {
            return Err(ServiceError::invalid(
                ErrorCode::InvalidParameter,
                "Object key must name a file",
            ));
        }

        let byte_range = match (range.offset, range.length) {
            (None, None) => None,
            (offset, length) => {
                let offset = offset.unwrap_or(0);
                let size = self.store.stat_object(&bucket, key).await?;
                check_range(offset, length, size)?;
                Some(ByteRange::new(offset, length))
            }
        };

        let data = self.store.get_object(&bucket, key, byte_range).await?;
        Ok(DownloadedObject {
            file_name: file_name.to_string(),
            data,
        })
    }

    /// How many ranged reads of `length` bytes cover the object. The last
    /// read may be short.
    pub async fn chunk_count(
        &self,
        bucket: Option<&str>,
        key: &str,
        length: u64,
    ) -> ServiceResult<ObjectChunkCount> {
        if length == 0 {
            return Err(ServiceError::invalid(
                ErrorCode::InvalidParameter,
                "length must be greater than zero",
            ));
        }
        let bucket = self.config.resolve_bucket(bucket);
        let size = self
            .store
            .stat_object(&bucket, key.trim_start_matches('/'))
            .await?;
        Ok(ObjectChunkCount {
            size,
            length,
            chunks: size.div_ceil(length),
        })
    }

    pub async fn remove(&self, bucket: Option<&str>, key: &str) -> ServiceResult<()> {
        let bucket = self.config.resolve_bucket(bucket);
        let key = key.trim_start_matches('/');
        self.store.remove_object(&bucket, key).await?;
        tracing::info!("Removed {}/{}", bucket, key);
        Ok(())
    }

    /// Direct children of `prefix`: files plus `sub/` directories, capped at 100.
    pub async fn list(&self, bucket: Option<&str>, query: &ListObjectsQuery) -> ServiceResult<Vec<String>> {
        let bucket = self.config.resolve_bucket(bucket);
        let prefix = match query.prefix.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() && !p.ends_with('/') => format!("{}/", p),
            Some(p) => p.to_string(),
            None => String::new(),
        };
        let limit = query.limit.unwrap_or(MAX_LIST_ENTRIES).min(MAX_LIST_ENTRIES);

        let entries = self.store.list_objects(&bucket, &prefix, false).await?;
        Ok(entries
            .into_iter()
            .filter(|key| *key != prefix)
            .take(limit)
            .collect())
    }
}

fn check_range(offset: u64, length: Option<u64>, size: u64) -> ServiceResult<()> {
    let past_end = match length {
        Some(len) => offset.checked_add(len).is_none_or(|end| end > size),
        None => offset > size,
    };
    if offset > size || past_end {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidRange,
            format!(
                "Range offset={} length={:?} exceeds object size {}",
                offset, length, size
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::InMemoryObjectStore;

    fn service() -> (Arc<InMemoryObjectStore>, ObjectService) {
        let store = Arc::new(InMemoryObjectStore::with_buckets(["public", "media"]));
        let svc = ObjectService::new(store.clone(), OssConfig::development());
        (store, svc)
    }

    #[tokio::test]
    async fn test_upload_defaults_bucket_and_sniffs_type() {
        let (store, svc) = service();
        let png = Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]);

        let uploaded = svc.upload(Some(" "), "logo.png", None, png).await.unwrap();
        assert_eq!(uploaded.bucket, "public");
        assert!(uploaded.object_key.ends_with(".png"));
        assert_eq!(uploaded.content_type, "image/png");
        assert_eq!(
            uploaded.url,
            format!("http://localhost:9000/public/{}", uploaded.object_key)
        );
        assert_eq!(
            store.content_type("public", &uploaded.object_key).await.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let (_, svc) = service();
        let data = Bytes::from_static(b"hello");

        let cases = [
            (svc.upload(None, "a.txt", None, Bytes::new()).await, ErrorCode::EmptyFile),
            (svc.upload(None, "", None, data.clone()).await, ErrorCode::EmptyFileName),
            (svc.upload(None, "notes", None, data.clone()).await, ErrorCode::MissingExtension),
        ];
        for (result, code) in cases {
            assert_eq!(result.unwrap_err().code(), Some(code));
        }
    }

    #[tokio::test]
    async fn test_range_download() {
        let (_, svc) = service();
        let uploaded = svc
            .upload(Some("media"), "digits.txt", Some("text/plain"), Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let part = svc
            .download(
                Some("media"),
                &uploaded.object_key,
                &RangeQuery {
                    offset: Some(4),
                    length: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(&part.data[..], b"456");

        let err = svc
            .download(
                Some("media"),
                &uploaded.object_key,
                &RangeQuery {
                    offset: Some(8),
                    length: Some(5),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidRange));

        let whole = svc
            .download(Some("media"), &uploaded.object_key, &RangeQuery::default())
            .await
            .unwrap();
        assert_eq!(whole.data.len(), 10);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (_, svc) = service();
        let err = svc
            .download(None, "2024/01/01/missing.txt", &RangeQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_direct_children() {
        let (store, svc) = service();
        for key in ["docs/a.txt", "docs/deep/b.txt", "top.txt"] {
            store
                .put_object("public", key, Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }

        let listed = svc
            .list(
                None,
                &ListObjectsQuery {
                    prefix: Some("docs".to_string()),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(listed, vec!["docs/a.txt".to_string(), "docs/deep/".to_string()]);
    }

    #[tokio::test]
    async fn test_chunk_count_covers_the_tail() {
        let (_, svc) = service();
        let uploaded = svc
            .upload(None, "digits.txt", Some("text/plain"), Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let count = svc.chunk_count(None, &uploaded.object_key, 4).await.unwrap();
        assert_eq!(
            count,
            ObjectChunkCount {
                size: 10,
                length: 4,
                chunks: 3
            }
        );
        assert_eq!(
            svc.chunk_count(None, &uploaded.object_key, 5).await.unwrap().chunks,
            2
        );
        assert_eq!(
            svc.chunk_count(None, &uploaded.object_key, 0)
                .await
                .unwrap_err()
                .code(),
            Some(ErrorCode::InvalidParameter)
        );
        assert!(matches!(
            svc.chunk_count(None, "2024/01/01/missing.txt", 4).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(0, Some(10), 10).is_ok());
        assert!(check_range(10, None, 10).is_ok());
        assert!(check_range(11, None, 10).is_err());
        assert!(check_range(5, Some(6), 10).is_err());
        assert!(check_range(u64::MAX, Some(2), 10).is_err());
    }
}
