use crate::services::storage::StorageError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable, user-facing codes for rejected requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EmptyFile,
    EmptyFileName,
    MissingExtension,
    FileTooLarge,
    InvalidParameter,
    ChunkTooSmall,
    ChunkIndexOutOfRange,
    IncompleteUpload,
    InvalidBucketName,
    InvalidPolicy,
    BuiltInTemplate,
    InvalidRange,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyFile => "EMPTY_FILE",
            ErrorCode::EmptyFileName => "EMPTY_FILE_NAME",
            ErrorCode::MissingExtension => "MISSING_EXTENSION",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::ChunkTooSmall => "CHUNK_TOO_SMALL",
            ErrorCode::ChunkIndexOutOfRange => "CHUNK_INDEX_OUT_OF_RANGE",
            ErrorCode::IncompleteUpload => "INCOMPLETE_UPLOAD",
            ErrorCode::InvalidBucketName => "INVALID_BUCKET_NAME",
            ErrorCode::InvalidPolicy => "INVALID_POLICY",
            ErrorCode::BuiltInTemplate => "BUILT_IN_TEMPLATE",
            ErrorCode::InvalidRange => "INVALID_RANGE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a service operation.
///
/// `InvalidArgument` and `Conflict` are always raised before the object store
/// is mutated. `Backend` wraps anything the store itself reported.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{code}: {message}")]
    InvalidArgument { code: ErrorCode, message: String },

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Backend(StorageError),
}

impl ServiceError {
    pub fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ServiceError::InvalidArgument { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { bucket, key } => {
                ServiceError::NotFound(format!("Object '{}' not found in bucket '{}'", key, bucket))
            }
            StorageError::BucketNotFound(bucket) => {
                ServiceError::NotFound(format!("Bucket '{}' does not exist", bucket))
            }
            StorageError::NoPolicy(bucket) => {
                ServiceError::NotFound(format!("Bucket '{}' has no policy", bucket))
            }
            other => ServiceError::Backend(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: ServiceError = StorageError::NotFound {
            bucket: "public".to_string(),
            key: "a/b.txt".to_string(),
        }
        .into();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_backend_error_is_preserved() {
        let err: ServiceError = StorageError::Backend(anyhow::anyhow!("connection reset")).into();
        assert!(matches!(err, ServiceError::Backend(_)));
        assert!(err.code().is_none());
    }

    #[test]
    fn test_error_code_serializes_as_stable_string() {
        let json = serde_json::to_string(&ErrorCode::ChunkTooSmall).unwrap();
        assert_eq!(json, "\"CHUNK_TOO_SMALL\"");
        assert_eq!(ErrorCode::ChunkTooSmall.as_str(), "CHUNK_TOO_SMALL");
    }
}
