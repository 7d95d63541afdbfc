use crate::AppState;
use crate::api::error::AppError;
use crate::services::object_service::{
    ChunkCountQuery, ListObjectsQuery, ObjectChunkCount, RangeQuery, UploadedObject,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

#[utoipa::path(
    post,
    path = "/objects/{bucket}",
    params(("bucket" = String, Path, description = "Target bucket")),
    request_body(content = Multipart, description = "File upload, field `file`"),
    responses(
        (status = 200, description = "File stored", body = UploadedObject),
        (status = 400, description = "Empty file, missing name or extension, too large")
    ),
    tag = "objects"
)]
pub async fn upload_object(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadedObject>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let uploaded = state
            .objects
            .upload(Some(&bucket), &file_name, content_type.as_deref(), data)
            .await?;
        return Ok(Json(uploaded));
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

#[utoipa::path(
    get,
    path = "/objects/{bucket}",
    params(("bucket" = String, Path, description = "Bucket"), ListObjectsQuery),
    responses((status = 200, description = "Direct children of the prefix", body = Vec<String>)),
    tag = "objects"
)]
pub async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<ListObjectsQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.objects.list(Some(&bucket), &query).await?))
}

#[utoipa::path(
    get,
    path = "/objects/{bucket}/{key}",
    params(
        ("bucket" = String, Path, description = "Bucket"),
        ("key" = String, Path, description = "Object key"),
        RangeQuery
    ),
    responses(
        (status = 200, description = "Object bytes"),
        (status = 400, description = "Range outside the object"),
        (status = 404, description = "Object not found")
    ),
    tag = "objects"
)]
pub async fn download_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(range): Query<RangeQuery>,
) -> Result<Response, AppError> {
    let object = state.objects.download(Some(&bucket), &key, &range).await?;

    let encoded_filename = utf8_percent_encode(&object.file_name, NON_ALPHANUMERIC).to_string();
    let content_disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        encoded_filename, encoded_filename
    );
    let status = if range.offset.is_some() || range.length.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        [
            (header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition),
            (
                header::HeaderName::from_static("x-original-file-name"),
                encoded_filename,
            ),
        ],
        object.data,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/object-chunks/{bucket}/{key}",
    params(
        ("bucket" = String, Path, description = "Bucket"),
        ("key" = String, Path, description = "Object key"),
        ChunkCountQuery
    ),
    responses(
        (status = 200, description = "Number of ranged reads covering the object", body = ObjectChunkCount),
        (status = 400, description = "Zero length"),
        (status = 404, description = "Object not found")
    ),
    tag = "objects"
)]
pub async fn object_chunk_count(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ChunkCountQuery>,
) -> Result<Json<ObjectChunkCount>, AppError> {
    Ok(Json(
        state
            .objects
            .chunk_count(Some(&bucket), &key, query.length)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/objects/{bucket}/{key}",
    params(
        ("bucket" = String, Path, description = "Bucket"),
        ("key" = String, Path, description = "Object key")
    ),
    responses((status = 204, description = "Object removed (or already absent)")),
    tag = "objects"
)]
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.objects.remove(Some(&bucket), &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
