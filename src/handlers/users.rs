//! Profile, assigned-project and user administration handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::DEFAULT_ROLE,
    error::{AppError, ApiResult},
    handlers::{
        projects::{project_page, ProjectListResponse, ProjectQuery, ProjectResponse, ProjectStats},
        MessageResponse, Names,
    },
    middleware::CurrentUser,
    models::{NewUser, User, UserChanges},
    pagination::{PaginationMeta, PaginationParams},
    store::{ProjectFilter, Store},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub role_id: Option<i32>,
    #[schema(example = "user")]
    pub role_name: Option<String>,
    pub organization_id: Option<i32>,
    #[schema(example = "Acme Corp")]
    pub organization_name: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl UserResponse {
    pub(crate) fn describe(user: User, names: &mut Names<'_>) -> Result<Self, AppError> {
        Ok(Self {
            role_name: names.role(user.role_id)?,
            organization_name: names.organization(user.organization_id)?,
            id: user.id,
            username: user.username,
            email: user.email,
            role_id: user.role_id,
            organization_id: user.organization_id,
            is_active: user.is_active,
            created_at: user.created_at,
        })
    }

    fn describe_all(store: &dyn Store, users: Vec<User>) -> Result<Vec<Self>, AppError> {
        let mut names = Names::new(store);
        users
            .into_iter()
            .map(|u| Self::describe(u, &mut names))
            .collect()
    }
}

/// Compact user entry for rosters.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub role_id: Option<i32>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role_id: user.role_id,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserResponse>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MyPermissionsResponse {
    pub user_id: i32,
    #[schema(example = "project_manager")]
    pub role: Option<String>,
    pub is_system_role: bool,
    pub is_admin: bool,
    #[schema(example = json!(["projects.read", "users.read"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    #[schema(example = "bob")]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@example.com")]
    pub email: String,
    pub password: String,
    /// Administrators only. Defaults to the `user` role.
    pub role_id: Option<i32>,
    /// Defaults to the caller's organization.
    pub organization_id: Option<i32>,
    /// Administrators only.
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub password: Option<String>,
    /// Administrators only.
    pub role_id: Option<i32>,
    /// Administrators only.
    pub organization_id: Option<i32>,
    /// Administrators only.
    pub is_active: Option<bool>,
}

fn describe_user(state: &AppState, user: User) -> Result<UserResponse, AppError> {
    UserResponse::describe(user, &mut Names::new(state.store.as_ref()))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "The caller's profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<UserResponse>> {
    Ok(Json(describe_user(&state, user)?))
}

#[utoipa::path(
    put,
    path = "/users/me",
    tag = "Users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 409, description = "Username or email already taken", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserResponse>> {
    payload.validate().map_err(AppError::from)?;

    let password_hash = match payload.password {
        Some(password) => Some(state.credentials.hash_new_password(&password).await?),
        None => None,
    };
    let changes = UserChanges {
        username: payload.username.map(|u| u.trim().to_string()),
        email: payload.email.map(|e| e.to_lowercase()),
        password_hash,
        ..UserChanges::default()
    };

    let updated = if changes.is_empty() {
        user
    } else {
        let updated = state.store.update_user(user.id, changes)?;
        info!(user_id = updated.id, "Profile updated");
        updated
    };
    Ok(Json(describe_user(&state, updated)?))
}

#[utoipa::path(
    get,
    path = "/users/me/permissions",
    tag = "Users",
    responses(
        (status = 200, description = "Effective permissions of the caller", body = MyPermissionsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<MyPermissionsResponse>> {
    let role = match user.role_id {
        Some(id) => state.resolver.graph().role(id)?,
        None => None,
    };
    let permissions = state.resolver.all_permissions(&user)?;

    Ok(Json(MyPermissionsResponse {
        user_id: user.id,
        is_system_role: role.as_ref().is_some_and(|r| r.is_system),
        role: role.map(|r| r.name),
        is_admin: state.resolver.is_admin(&user)?,
        permissions: permissions.into_iter().collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/me/projects",
    tag = "Users",
    params(PaginationParams, ProjectQuery),
    responses(
        (status = 200, description = "Projects whose team includes the caller", body = ProjectListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<Json<ProjectListResponse>> {
    let base = query.refine(ProjectFilter::default());
    let (projects, total) = state
        .guard
        .assigned_projects(&user, base, pagination.window())?;

    Ok(Json(ProjectListResponse {
        data: ProjectResponse::describe_all(state.store.as_ref(), projects)?,
        pagination: pagination.into_metadata(total),
    }))
}

#[utoipa::path(
    get,
    path = "/users/me/projects/{project_id}",
    tag = "Users",
    params(("project_id" = i32, Path, description = "Project id")),
    responses(
        (status = 200, description = "An assigned project", body = ProjectResponse),
        (status = 404, description = "Project not found or not accessible", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<i32>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state.guard.assigned_project(&user, project_id)?;
    Ok(Json(ProjectResponse::describe_one(
        state.store.as_ref(),
        project,
    )?))
}

fn own_organization(user: &User) -> Result<i32, AppError> {
    user.organization_id
        .ok_or_else(|| AppError::forbidden("User is not associated with any organization"))
}

#[utoipa::path(
    get,
    path = "/users/me/organization/projects",
    tag = "Users",
    params(PaginationParams, ProjectQuery),
    responses(
        (status = 200, description = "Projects of the caller's organization", body = ProjectListResponse),
        (status = 403, description = "Caller has no organization", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_organization_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<Json<ProjectListResponse>> {
    let filter = query.refine(ProjectFilter::in_organization(own_organization(&user)?));
    Ok(Json(project_page(state.store.as_ref(), &filter, pagination)?))
}

#[utoipa::path(
    get,
    path = "/users/me/organization/projects/stats",
    tag = "Users",
    responses(
        (status = 200, description = "Project counts for the caller's organization", body = ProjectStats),
        (status = 403, description = "Caller has no organization", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_organization_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<ProjectStats>> {
    let filter = ProjectFilter::in_organization(own_organization(&user)?);
    Ok(Json(ProjectStats::for_filter(state.store.as_ref(), &filter)?))
}

/// Loads a user inside the caller's scope. Users outside it are reported
/// as missing.
fn scoped_user(state: &AppState, actor: &User, user_id: i32) -> Result<User, AppError> {
    let scope = state.guard.organization_scope(actor)?;
    let user = state.store.get_user(user_id)?;
    if scope.matches(&user) {
        Ok(user)
    } else {
        Err(AppError::not_found("User not found"))
    }
}

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "User Administration",
    params(PaginationParams),
    responses(
        (status = 200, description = "Users visible to the caller", body = UserListResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<UserListResponse>> {
    state.resolver.require_permission(&user, "users.read")?;
    let filter = state.guard.organization_scope(&user)?;

    let total = state.store.count_users(&filter)?;
    let users = state.store.list_users(&filter, pagination.window())?;
    Ok(Json(UserListResponse {
        data: UserResponse::describe_all(state.store.as_ref(), users)?,
        pagination: pagination.into_metadata(total),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "User Administration",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Role or organization not found", body = crate::error::ApiError),
        (status = 409, description = "Username or email already taken", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_permission(&actor, "users.create")?;
    let is_admin = state.resolver.is_admin(&actor)?;

    if !is_admin && (payload.role_id.is_some() || payload.is_active.is_some()) {
        return Err(AppError::forbidden("Admin access required").into());
    }

    let role_id = match payload.role_id {
        Some(id) => state.store.get_role(id)?.id,
        None => state
            .store
            .find_role_by_name(DEFAULT_ROLE)?
            .map(|r| r.id)
            .ok_or_else(|| AppError::not_found("Role not found"))?,
    };

    let organization_id = match payload.organization_id {
        Some(id) if is_admin || actor.organization_id == Some(id) => {
            Some(state.store.get_organization(id)?.id)
        }
        Some(_) => return Err(AppError::forbidden("Not enough permissions").into()),
        None => actor.organization_id,
    };

    let password_hash = state.credentials.hash_new_password(&payload.password).await?;
    let user = state.store.create_user(NewUser {
        username: payload.username.trim().to_string(),
        email: payload.email.to_lowercase(),
        password_hash,
        role_id: Some(role_id),
        organization_id,
        is_active: payload.is_active.unwrap_or(true),
    })?;

    info!(
        user_id = user.id,
        role_id,
        created_by = actor.id,
        "User created"
    );
    Ok((StatusCode::CREATED, Json(describe_user(&state, user)?)))
}

#[utoipa::path(
    put,
    path = "/admin/users/{user_id}",
    tag = "User Administration",
    params(("user_id" = i32, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "User, role or organization not found", body = crate::error::ApiError),
        (status = 409, description = "Username or email already taken", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(user_id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_permission(&actor, "users.update")?;
    let target = scoped_user(&state, &actor, user_id)?;

    let password_hash = match payload.password {
        Some(password) => Some(state.credentials.hash_new_password(&password).await?),
        None => None,
    };
    let changes = UserChanges {
        username: payload.username.map(|u| u.trim().to_string()),
        email: payload.email.map(|e| e.to_lowercase()),
        password_hash,
        role_id: payload.role_id.map(Some),
        organization_id: payload.organization_id.map(Some),
        is_active: payload.is_active,
    };

    if changes.is_privileged() {
        state.resolver.require_admin(&actor)?;
    }
    if let Some(Some(role_id)) = changes.role_id {
        state.store.get_role(role_id)?;
    }
    if let Some(Some(organization_id)) = changes.organization_id {
        state.store.get_organization(organization_id)?;
    }

    let updated = if changes.is_empty() {
        target
    } else {
        state.store.update_user(target.id, changes)?
    };

    info!(user_id = updated.id, updated_by = actor.id, "User updated");
    Ok(Json(describe_user(&state, updated)?))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{user_id}",
    tag = "User Administration",
    params(("user_id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 412, description = "User still owns projects", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(user_id): Path<i32>,
) -> ApiResult<Json<MessageResponse>> {
    state.resolver.require_permission(&actor, "users.delete")?;
    let target = scoped_user(&state, &actor, user_id)?;
    if target.id == actor.id {
        return Err(AppError::PreconditionFailed(
            "Cannot delete your own account".to_string(),
        )
        .into());
    }

    state.store.delete_user(target.id)?;

    info!(user_id = target.id, deleted_by = actor.id, "User deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
