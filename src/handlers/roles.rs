//! Role management handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::DEFAULT_ROLE,
    authz::SYSTEM_ADMIN,
    error::{AppError, ApiResult},
    handlers::MessageResponse,
    middleware::CurrentUser,
    models::{NewRole, Permission, Role, User},
    store::Store,
    AppState,
};

/// Granting `system.admin` hands out administrator authority, so only an
/// administrator may do it.
fn guard_grants(state: &AppState, user: &User, permission_ids: &[i32]) -> Result<(), AppError> {
    if let Some(admin_permission) = state.store.find_permission_by_name(SYSTEM_ADMIN)? {
        if permission_ids.contains(&admin_permission.id) {
            state.resolver.require_admin(user)?;
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 50, message = "Role name must be 1-50 characters"))]
    #[schema(example = "auditor")]
    pub name: String,
    /// Unknown ids are ignored.
    #[serde(default)]
    #[schema(example = json!([6, 17]))]
    pub permission_ids: Vec<i32>,
    /// System roles hold every permission. Administrators only.
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 50, message = "Role name must be 1-50 characters"))]
    pub name: Option<String>,
    /// Replaces the whole grant set when present.
    pub permission_ids: Option<Vec<i32>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub id: i32,
    #[schema(example = "project_manager")]
    pub name: String,
    pub is_system: bool,
    /// Effective permissions; a system role lists the whole catalog.
    pub permissions: Vec<Permission>,
}

impl RoleResponse {
    fn describe(store: &dyn Store, role: Role) -> Result<Self, AppError> {
        let permissions = if role.is_system {
            store.list_permissions()?
        } else {
            store.permissions_of_role(role.id)?
        };
        Ok(Self {
            id: role.id,
            name: role.name,
            is_system: role.is_system,
            permissions,
        })
    }
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    responses(
        (status = 200, description = "All roles with their permissions", body = Vec<RoleResponse>),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    state.resolver.require_permission(&user, "roles.read")?;

    let roles = state
        .store
        .list_roles()?
        .into_iter()
        .map(|role| RoleResponse::describe(state.store.as_ref(), role))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 409, description = "Role name already exists", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_permission(&user, "roles.create")?;
    if payload.is_system {
        state.resolver.require_admin(&user)?;
    }
    guard_grants(&state, &user, &payload.permission_ids)?;

    let role = state.store.create_role(
        NewRole {
            name: payload.name.trim().to_string(),
            is_system: payload.is_system,
        },
        &payload.permission_ids,
    )?;

    info!(
        role_id = role.id,
        role = %role.name,
        is_system = role.is_system,
        created_by = user.id,
        "Role created"
    );
    Ok((
        StatusCode::CREATED,
        Json(RoleResponse::describe(state.store.as_ref(), role)?),
    ))
}

#[utoipa::path(
    put,
    path = "/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = i32, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Role not found", body = crate::error::ApiError),
        (status = 409, description = "Role name already exists", body = crate::error::ApiError),
        (status = 412, description = "System role, or renaming the default role", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(role_id): Path<i32>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_permission(&user, "roles.update")?;

    let existing = state.store.get_role(role_id)?;
    if user.role_id == Some(role_id) && !state.resolver.is_admin(&user)? {
        return Err(AppError::forbidden("Cannot modify your own role").into());
    }
    if let Some(grants) = payload.permission_ids.as_deref() {
        guard_grants(&state, &user, grants)?;
    }
    if existing.name == DEFAULT_ROLE
        && payload
            .name
            .as_deref()
            .is_some_and(|name| name.trim() != DEFAULT_ROLE)
    {
        return Err(
            AppError::PreconditionFailed("The default role cannot be renamed".to_string()).into(),
        );
    }

    let role = state.store.update_role(
        role_id,
        payload.name.map(|n| n.trim().to_string()),
        payload.permission_ids.as_deref(),
    )?;

    info!(role_id = role.id, updated_by = user.id, "Role updated");
    Ok(Json(RoleResponse::describe(state.store.as_ref(), role)?))
}

#[utoipa::path(
    delete,
    path = "/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = i32, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted", body = MessageResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Role not found", body = crate::error::ApiError),
        (status = 412, description = "System role, default role, or users still hold it", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(role_id): Path<i32>,
) -> ApiResult<Json<MessageResponse>> {
    state.resolver.require_permission(&user, "roles.delete")?;
    if state.store.get_role(role_id)?.name == DEFAULT_ROLE {
        return Err(
            AppError::PreconditionFailed("The default role cannot be deleted".to_string()).into(),
        );
    }
    state.store.delete_role(role_id)?;

    info!(role_id, deleted_by = user.id, "Role deleted");
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}
