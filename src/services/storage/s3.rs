use super::{ByteRange, ObjectStore, StorageError, StorageResult};
use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left unescaped in the `x-amz-copy-source` header.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Object store backed by any S3-compatible endpoint (MinIO, AWS, ...).
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn copy_source(bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, utf8_percent_encode(key, COPY_SOURCE))
    }

    async fn abort_compose(&self, bucket: &str, dest_key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(dest_key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                "Failed to abort compose upload {} for {}/{}: {:?}",
                upload_id,
                bucket,
                dest_key,
                e
            );
        }
    }

    async fn compose_parts(
        &self,
        bucket: &str,
        dest_key: &str,
        upload_id: &str,
        sources: &[String],
    ) -> StorageResult<()> {
        let mut completed_parts = Vec::with_capacity(sources.len());

        for (i, source) in sources.iter().enumerate() {
            let part_number = i32::try_from(i + 1)
                .map_err(|_| StorageError::Backend(anyhow!("Too many compose sources")))?;

            let res = self
                .client
                .upload_part_copy()
                .bucket(bucket)
                .key(dest_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(Self::copy_source(bucket, source))
                .send()
                .await
                .map_err(|e| classify(e, bucket))?;

            let e_tag = res
                .copy_part_result
                .and_then(|r| r.e_tag)
                .unwrap_or_default();

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(e_tag)
                    .part_number(part_number)
                    .build(),
            );
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(dest_key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;

        Ok(())
    }
}

/// Maps an SDK failure to a storage error, recognising a missing bucket.
fn classify<E>(err: SdkError<E>, bucket: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.code() {
        Some("NoSuchBucket") => StorageError::BucketNotFound(bucket.to_string()),
        _ => StorageError::Backend(anyhow!("{}", DisplayErrorContext(&err))),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let res = self.client.head_bucket().bucket(bucket).send().await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(anyhow!(service_error)))
                }
            }
        }
    }

    async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;
        Ok(())
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let res = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StorageError::Backend(anyhow!(e.into_service_error())))?;

        Ok(res
            .buckets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|b| b.name)
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StorageResult<Bytes> {
        let res = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.map(|r| r.to_header()))
            .send()
            .await;

        let output = match res {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                return Err(StorageError::Backend(anyhow!(service_error)));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(anyhow!(e)))?;
        Ok(data.into_bytes())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> StorageResult<Vec<String>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token);
            if !recursive {
                request = request.delimiter("/");
            }

            let res = request.send().await.map_err(|e| classify(e, bucket))?;

            if let Some(common_prefixes) = res.common_prefixes {
                objects.extend(common_prefixes.into_iter().filter_map(|p| p.prefix));
            }

            if let Some(contents) = res.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        objects.push(key);
                    }
                }
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        let res = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(output) => Ok(output.content_length.unwrap_or(0).max(0) as u64),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Err(StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                } else {
                    Err(StorageError::Backend(anyhow!(service_error)))
                }
            }
        }
    }

    async fn compose_object(
        &self,
        bucket: &str,
        dest_key: &str,
        sources: &[String],
    ) -> StorageResult<u64> {
        if sources.is_empty() {
            return Err(StorageError::Backend(anyhow!("Compose requires at least one source")));
        }

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| StorageError::Backend(anyhow!("No upload ID")))?
            .to_string();

        if let Err(e) = self.compose_parts(bucket, dest_key, &upload_id, sources).await {
            tracing::error!(
                "S3 compose failed: bucket={}, dest={}, sources={}, error={:?}",
                bucket,
                dest_key,
                sources.len(),
                e
            );
            self.abort_compose(bucket, dest_key, &upload_id).await;
            return Err(e);
        }

        self.stat_object(bucket, dest_key).await
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| classify(e, bucket))?;
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> StorageResult<String> {
        let res = self.client.get_bucket_policy().bucket(bucket).send().await;

        match res {
            Ok(output) => Ok(output.policy.unwrap_or_default()),
            Err(e) => {
                let service_error = e.into_service_error();
                match service_error.code() {
                    Some("NoSuchBucketPolicy") => Err(StorageError::NoPolicy(bucket.to_string())),
                    Some("NoSuchBucket") => Err(StorageError::BucketNotFound(bucket.to_string())),
                    _ => Err(StorageError::Backend(anyhow!(service_error))),
                }
            }
        }
    }
}
