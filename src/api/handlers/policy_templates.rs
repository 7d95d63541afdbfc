use crate::AppState;
use crate::api::error::AppError;
use crate::services::policy_template::{
    CreatePolicyTemplateRequest, PolicyTemplate, UpdatePolicyTemplateRequest,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/policy-templates",
    responses((status = 200, description = "All templates by name", body = Vec<PolicyTemplate>)),
    tag = "policy-templates"
)]
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<PolicyTemplate>> {
    Json(state.policy_templates.list())
}

#[utoipa::path(
    post,
    path = "/policy-templates",
    request_body = CreatePolicyTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = PolicyTemplate),
        (status = 400, description = "Missing or invalid policy"),
        (status = 409, description = "Name already taken")
    ),
    tag = "policy-templates"
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(req): Json<CreatePolicyTemplateRequest>,
) -> Result<(StatusCode, Json<PolicyTemplate>), AppError> {
    let template = state.policy_templates.create(req)?;
    Ok((StatusCode::CREATED, Json(template)))
}

#[utoipa::path(
    get,
    path = "/policy-templates/{name}",
    params(("name" = String, Path, description = "Template name")),
    responses(
        (status = 200, description = "Template", body = PolicyTemplate),
        (status = 404, description = "Unknown template")
    ),
    tag = "policy-templates"
)]
pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PolicyTemplate>, AppError> {
    Ok(Json(state.policy_templates.get(&name)?))
}

#[utoipa::path(
    put,
    path = "/policy-templates/{name}",
    params(("name" = String, Path, description = "Template name")),
    request_body = UpdatePolicyTemplateRequest,
    responses(
        (status = 200, description = "Template updated", body = PolicyTemplate),
        (status = 400, description = "Built-in type change or invalid policy"),
        (status = 404, description = "Unknown template")
    ),
    tag = "policy-templates"
)]
pub async fn update_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdatePolicyTemplateRequest>,
) -> Result<Json<PolicyTemplate>, AppError> {
    Ok(Json(state.policy_templates.update(&name, req)?))
}

#[utoipa::path(
    delete,
    path = "/policy-templates/{name}",
    params(("name" = String, Path, description = "Template name")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 400, description = "Built-in templates cannot be deleted"),
        (status = 404, description = "Unknown template")
    ),
    tag = "policy-templates"
)]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.policy_templates.delete(&name)?;
    Ok(StatusCode::NO_CONTENT)
}
