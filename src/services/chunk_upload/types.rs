use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct InitChunkUploadRequest {
    #[validate(length(max = 255, message = "File name must be at most 255 characters"))]
    pub file_name: String,
    #[validate(length(max = 128, message = "File digest must be at most 128 characters"))]
    pub file_md5: String,
    pub total_size: u64,
    pub chunk_size: u64,
    #[validate(length(max = 128, message = "Session id must be at most 128 characters"))]
    pub upload_session_id: String,
}

/// Progress of an upload as reconstructed from the stored chunks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ChunkUploadStatus {
    pub file_name: Option<String>,
    pub file_md5: String,
    pub total_size: Option<u64>,
    pub chunk_size: Option<u64>,
    pub total_chunks: u32,
    /// Ascending, without duplicates.
    pub uploaded_chunks: Vec<u32>,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadChunkQuery {
    pub file_name: Option<String>,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadChunkResponse {
    pub upload_session_id: String,
    pub file_md5: String,
    pub chunk_index: u32,
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct CompleteChunkUploadRequest {
    #[validate(length(max = 255, message = "File name must be at most 255 characters"))]
    pub file_name: String,
    pub file_md5: String,
    pub upload_session_id: String,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CompletedUpload {
    pub bucket: String,
    pub object_key: String,
    pub url: String,
    pub size: u64,
}

/// Query shared by status and cancel.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChunkUploadLookup {
    pub file_md5: String,
    pub bucket_name: Option<String>,
    pub upload_session_id: Option<String>,
}
