use crate::AppState;
use crate::api::error::AppError;
use crate::services::bucket_service::{BucketPolicy, CreateBucketRequest};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetBucketPolicyRequest {
    /// Policy JSON, stored as given.
    pub policy: String,
}

#[utoipa::path(
    get,
    path = "/buckets",
    responses((status = 200, description = "Bucket names", body = Vec<String>)),
    tag = "buckets"
)]
pub async fn list_buckets(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.buckets.list_buckets().await?))
}

#[utoipa::path(
    post,
    path = "/buckets",
    request_body = CreateBucketRequest,
    responses(
        (status = 201, description = "Bucket created"),
        (status = 400, description = "Invalid bucket name"),
        (status = 409, description = "Bucket already exists")
    ),
    tag = "buckets"
)]
pub async fn create_bucket(
    State(state): State<AppState>,
    Json(req): Json<CreateBucketRequest>,
) -> Result<StatusCode, AppError> {
    state.buckets.create_bucket(&req).await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/buckets/{bucket}",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 204, description = "Bucket deleted"),
        (status = 404, description = "Bucket not found")
    ),
    tag = "buckets"
)]
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    state.buckets.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/buckets/{bucket}/policy",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Current policy", body = BucketPolicy),
        (status = 404, description = "Bucket or policy not found")
    ),
    tag = "buckets"
)]
pub async fn get_bucket_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketPolicy>, AppError> {
    Ok(Json(state.buckets.get_bucket_policy(&bucket).await?))
}

#[utoipa::path(
    put,
    path = "/buckets/{bucket}/policy",
    params(("bucket" = String, Path, description = "Bucket name")),
    request_body = SetBucketPolicyRequest,
    responses(
        (status = 204, description = "Policy stored"),
        (status = 400, description = "Policy is not JSON")
    ),
    tag = "buckets"
)]
pub async fn set_bucket_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<SetBucketPolicyRequest>,
) -> Result<StatusCode, AppError> {
    state.buckets.set_bucket_policy(&bucket, &req.policy).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/buckets/{bucket}/policy-template/{template}",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("template" = String, Path, description = "Policy template name")
    ),
    responses(
        (status = 200, description = "Rendered policy applied", body = BucketPolicy),
        (status = 404, description = "Bucket or template not found")
    ),
    tag = "buckets"
)]
pub async fn apply_policy_template(
    State(state): State<AppState>,
    Path((bucket, template)): Path<(String, String)>,
) -> Result<Json<BucketPolicy>, AppError> {
    Ok(Json(state.buckets.apply_template(&bucket, &template).await?))
}
