use std::env;
use std::str::FromStr;

/// Which object store the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// S3-compatible endpoint (MinIO, AWS)
    S3,
    /// Process-local store, contents are lost on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" | "minio" => Ok(StorageBackend::S3),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }
}

/// Object store and upload configuration
#[derive(Debug, Clone)]
pub struct OssConfig {
    /// S3 API endpoint (default: "http://127.0.0.1:9000")
    pub endpoint: String,

    /// Base of the URLs handed back to clients (default: same as `endpoint`)
    pub public_endpoint: String,

    pub access_key: String,
    pub secret_key: String,

    /// Bucket used when a request names none; chunks are always staged here (default: "public")
    pub default_bucket: String,

    /// Region sent to the S3 client (default: "us-east-1")
    pub region: String,

    pub storage_backend: StorageBackend,

    /// Maximum single-shot upload size in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// CORS origins; empty means any origin
    pub allowed_origins: Vec<String>,
}

impl Default for OssConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            public_endpoint: "http://127.0.0.1:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            default_bucket: "public".to_string(),
            region: "us-east-1".to_string(),
            storage_backend: StorageBackend::S3,
            max_file_size: 256 * 1024 * 1024, // 256 MB
            allowed_origins: Vec::new(),
        }
    }
}

impl OssConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let endpoint = env::var("MINIO_ENDPOINT").unwrap_or(default.endpoint);

        Self {
            public_endpoint: env::var("MINIO_PUBLIC_ENDPOINT").unwrap_or_else(|_| endpoint.clone()),
            endpoint,

            access_key: env::var("MINIO_ACCESS_KEY").unwrap_or(default.access_key),
            secret_key: env::var("MINIO_SECRET_KEY").unwrap_or(default.secret_key),
            default_bucket: env::var("MINIO_BUCKET").unwrap_or(default.default_bucket),
            region: env::var("MINIO_REGION").unwrap_or(default.region),

            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.storage_backend),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or(default.allowed_origins),
        }
    }

    /// In-memory store, no credentials needed
    pub fn development() -> Self {
        Self {
            public_endpoint: "http://localhost:9000".to_string(),
            storage_backend: StorageBackend::Memory,
            ..Self::default()
        }
    }

    /// `{public_endpoint}/{bucket}/{key}`
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_endpoint.trim_end_matches('/'),
            bucket,
            key
        )
    }

    /// The requested bucket, or the default one when none (or a blank one) is given.
    pub fn resolve_bucket(&self, bucket: Option<&str>) -> String {
        match bucket.map(str::trim) {
            Some(b) if !b.is_empty() => b.to_string(),
            _ => self.default_bucket.clone(),
        }
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "*")
        .map(str::to_string)
        .collect()
}
