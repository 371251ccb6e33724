//! Permission catalog and diagnostic check handlers.

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    authz::DecisionReason,
    error::{AppError, ApiResult},
    middleware::CurrentUser,
    models::Permission,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckPermissionRequest {
    pub user_id: i32,
    #[validate(length(min = 1, message = "Permission name is required"))]
    #[schema(example = "projects.create")]
    pub permission: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPermissionResponse {
    pub user_id: i32,
    #[schema(example = "projects.create")]
    pub permission: String,
    pub granted: bool,
    pub reason: DecisionReason,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckPermissionsBulkRequest {
    pub user_id: i32,
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 permissions"))]
    #[schema(example = json!(["projects.read", "projects.delete"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkPermissionResult {
    #[schema(example = "projects.read")]
    pub permission: String,
    pub granted: bool,
    pub reason: DecisionReason,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPermissionsBulkResponse {
    pub user_id: i32,
    pub results: Vec<BulkPermissionResult>,
    pub all_granted: bool,
    pub denied: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "Permissions",
    responses(
        (status = 200, description = "Permission catalog ordered by name", body = Vec<Permission>),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Permission>>> {
    state.resolver.require_permission(&user, "roles.read")?;
    Ok(Json(state.store.list_permissions()?))
}

#[utoipa::path(
    post,
    path = "/permissions/check",
    tag = "Permissions",
    request_body = CheckPermissionRequest,
    responses(
        (status = 200, description = "Decision and the path that produced it", body = CheckPermissionResponse),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CheckPermissionRequest>,
) -> ApiResult<Json<CheckPermissionResponse>> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_admin(&user)?;

    let subject = state.store.get_user(payload.user_id)?;
    let decision = state.resolver.check(&subject, &payload.permission)?;

    Ok(Json(CheckPermissionResponse {
        user_id: subject.id,
        permission: payload.permission,
        granted: decision.granted,
        reason: decision.reason,
        is_admin: state.resolver.is_admin(&subject)?,
    }))
}

#[utoipa::path(
    post,
    path = "/permissions/check-bulk",
    tag = "Permissions",
    request_body = CheckPermissionsBulkRequest,
    responses(
        (status = 200, description = "One decision per requested permission", body = CheckPermissionsBulkResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn check_permissions_bulk(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CheckPermissionsBulkRequest>,
) -> ApiResult<Json<CheckPermissionsBulkResponse>> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_admin(&user)?;

    let subject = state.store.get_user(payload.user_id)?;
    let mut results = Vec::with_capacity(payload.permissions.len());
    for permission in payload.permissions {
        let decision = state.resolver.check(&subject, &permission)?;
        results.push(BulkPermissionResult {
            permission,
            granted: decision.granted,
            reason: decision.reason,
        });
    }

    let denied: Vec<String> = results
        .iter()
        .filter(|r| !r.granted)
        .map(|r| r.permission.clone())
        .collect();

    Ok(Json(CheckPermissionsBulkResponse {
        user_id: subject.id,
        all_granted: denied.is_empty(),
        denied,
        results,
    }))
}
