use crate::config::{OssConfig, StorageBackend};
use crate::services::storage::{InMemoryObjectStore, ObjectStore, S3ObjectStore};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

/// Builds the object store named by the configuration and makes sure the
/// default bucket exists.
pub async fn setup_storage(config: &OssConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.storage_backend {
        StorageBackend::Memory => {
            info!("🧠 In-memory storage (contents are lost on restart)");
            Arc::new(InMemoryObjectStore::new())
        }
        StorageBackend::S3 => {
            info!(
                "☁️  S3 Storage: {} (Bucket: {})",
                config.endpoint, config.default_bucket
            );
            Arc::new(S3ObjectStore::new(s3_client(config).await))
        }
    };

    let bucket = &config.default_bucket;
    if store.bucket_exists(bucket).await? {
        info!("✅ Bucket '{}' is ready", bucket);
    } else {
        info!("🪣 Bucket '{}' not found, creating...", bucket);
        store.make_bucket(bucket).await?;
        info!("✅ Bucket '{}' created successfully", bucket);
    }

    Ok(store)
}

async fn s3_client(config: &OssConfig) -> aws_sdk_s3::Client {
    let aws_config = aws_config::from_env()
        .endpoint_url(&config.endpoint)
        .region(Region::new(config.region.clone()))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
