use crate::AppState;
use crate::api::error::AppError;
use crate::services::chunk_upload::{
    ChunkUploadLookup, ChunkUploadStatus, CleanupReport, CompleteChunkUploadRequest,
    CompletedUpload, InitChunkUploadRequest, UploadChunkQuery, UploadChunkResponse,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use validator::Validate;

#[utoipa::path(
    post,
    path = "/chunk-uploads/init",
    request_body = InitChunkUploadRequest,
    responses(
        (status = 200, description = "Session accepted; lists chunks already stored", body = ChunkUploadStatus),
        (status = 400, description = "Invalid file name, session or chunk size")
    ),
    tag = "chunk-uploads"
)]
pub async fn init_chunk_upload(
    State(state): State<AppState>,
    Json(req): Json<InitChunkUploadRequest>,
) -> Result<Json<ChunkUploadStatus>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let status = state.chunk_uploads.init_session(&req).await?;
    Ok(Json(status))
}

#[utoipa::path(
    put,
    path = "/chunk-uploads/sessions/{upload_session_id}/{file_md5}/chunks/{chunk_index}",
    request_body(content = Vec<u8>, description = "Chunk data", content_type = "application/octet-stream"),
    params(
        ("upload_session_id" = String, Path, description = "Upload session ID"),
        ("file_md5" = String, Path, description = "Digest of the whole file"),
        ("chunk_index" = u32, Path, description = "Chunk index (0-based)"),
        UploadChunkQuery
    ),
    responses(
        (status = 200, description = "Chunk stored", body = UploadChunkResponse),
        (status = 400, description = "Empty, undersized or out-of-range chunk")
    ),
    tag = "chunk-uploads"
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((upload_session_id, file_md5, chunk_index)): Path<(String, String, u32)>,
    Query(query): Query<UploadChunkQuery>,
    body: Bytes,
) -> Result<Json<UploadChunkResponse>, AppError> {
    let res = state
        .chunk_uploads
        .put_chunk(
            query.file_name.as_deref(),
            &upload_session_id,
            &file_md5,
            chunk_index,
            query.total_chunks,
            body,
        )
        .await?;
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/chunk-uploads/complete",
    request_body = CompleteChunkUploadRequest,
    responses(
        (status = 200, description = "Chunks merged into the final object", body = CompletedUpload),
        (status = 400, description = "Missing or undersized chunks"),
        (status = 404, description = "Session has no chunks")
    ),
    tag = "chunk-uploads"
)]
pub async fn complete_chunk_upload(
    State(state): State<AppState>,
    Json(req): Json<CompleteChunkUploadRequest>,
) -> Result<Json<CompletedUpload>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let completed = state.chunk_uploads.complete(&req).await?;
    Ok(Json(completed))
}

#[utoipa::path(
    get,
    path = "/chunk-uploads/status",
    params(ChunkUploadLookup),
    responses(
        (status = 200, description = "Chunks stored so far", body = ChunkUploadStatus)
    ),
    tag = "chunk-uploads"
)]
pub async fn chunk_upload_status(
    State(state): State<AppState>,
    Query(lookup): Query<ChunkUploadLookup>,
) -> Result<Json<ChunkUploadStatus>, AppError> {
    let status = state.chunk_uploads.status(&lookup).await?;
    Ok(Json(status))
}

#[utoipa::path(
    delete,
    path = "/chunk-uploads",
    params(ChunkUploadLookup),
    responses(
        (status = 200, description = "Temporary chunks removed", body = CleanupReport)
    ),
    tag = "chunk-uploads"
)]
pub async fn cancel_chunk_upload(
    State(state): State<AppState>,
    Query(lookup): Query<ChunkUploadLookup>,
) -> Result<Json<CleanupReport>, AppError> {
    let report = state.chunk_uploads.cancel(&lookup).await?;
    Ok(Json(report))
}
