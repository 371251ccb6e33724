//! Organization handlers.

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
    error::{AppError, ApiResult},
    handlers::{
        projects::{project_page, ProjectListResponse, ProjectQuery},
        users::UserSummary,
        MessageResponse,
    },
    middleware::CurrentUser,
    models::{NewOrganization, Organization},
    pagination::{Page, PaginationMeta, PaginationParams},
    store::{ProjectFilter, Store, UserFilter},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: i32,
    #[schema(example = "Acme Corp")]
    pub name: String,
    /// Number of member users.
    pub members: i64,
    pub projects: i64,
    pub created_at: NaiveDateTime,
}

impl OrganizationResponse {
    fn describe(store: &dyn Store, organization: Organization) -> Result<Self, AppError> {
        Ok(Self {
            members: store.count_users(&UserFilter::in_organization(organization.id))?,
            projects: store.count_projects(&ProjectFilter::in_organization(organization.id))?,
            id: organization.id,
            name: organization.name,
            created_at: organization.created_at,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationDetail {
    #[serde(flatten)]
    pub organization: OrganizationResponse,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationListResponse {
    pub data: Vec<OrganizationResponse>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OrganizationRequest {
    #[validate(length(min = 1, max = 100, message = "Organization name must be 1-100 characters"))]
    #[schema(example = "Acme Corp")]
    pub name: String,
}

fn members(store: &dyn Store, organization_id: i32) -> Result<Vec<UserSummary>, AppError> {
    Ok(store
        .list_users(&UserFilter::in_organization(organization_id), Page::ALL)?
        .into_iter()
        .map(UserSummary::from)
        .collect())
}

#[utoipa::path(
    get,
    path = "/organizations",
    tag = "Organizations",
    params(PaginationParams),
    responses(
        (status = 200, description = "All organizations with member and project counts", body = OrganizationListResponse),
        (status = 403, description = "Admin access required", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_organizations(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<OrganizationListResponse>> {
    state.resolver.require_admin(&user)?;

    let total = state.store.count_organizations()?;
    let data = state
        .store
        .list_organizations(pagination.window())?
        .into_iter()
        .map(|org| OrganizationResponse::describe(state.store.as_ref(), org))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(OrganizationListResponse {
        data,
        pagination: pagination.into_metadata(total),
    }))
}

#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    request_body = OrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = OrganizationResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 409, description = "Organization name already exists", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<OrganizationRequest>,
) -> ApiResult<(StatusCode, Json<OrganizationResponse>)> {
    payload.validate().map_err(AppError::from)?;
    state
        .resolver
        .require_permission(&user, "organizations.create")?;

    let organization = state.store.create_organization(NewOrganization {
        name: payload.name.trim().to_string(),
    })?;

    info!(
        organization_id = organization.id,
        name = %organization.name,
        created_by = user.id,
        "Organization created"
    );
    Ok((
        StatusCode::CREATED,
        Json(OrganizationResponse::describe(
            state.store.as_ref(),
            organization,
        )?),
    ))
}

#[utoipa::path(
    get,
    path = "/organizations/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = i32, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization with its members", body = OrganizationDetail),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Organization not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(organization_id): Path<i32>,
) -> ApiResult<Json<OrganizationDetail>> {
    let organization = state.guard.require_organization(&user, organization_id)?;
    let users = members(state.store.as_ref(), organization.id)?;

    Ok(Json(OrganizationDetail {
        organization: OrganizationResponse::describe(state.store.as_ref(), organization)?,
        users,
    }))
}

#[utoipa::path(
    put,
    path = "/organizations/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = i32, Path, description = "Organization id")),
    request_body = OrganizationRequest,
    responses(
        (status = 200, description = "Organization renamed", body = OrganizationResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Organization not found", body = crate::error::ApiError),
        (status = 409, description = "Organization name already exists", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(organization_id): Path<i32>,
    Json(payload): Json<OrganizationRequest>,
) -> ApiResult<Json<OrganizationResponse>> {
    payload.validate().map_err(AppError::from)?;
    state
        .resolver
        .require_permission(&user, "organizations.update")?;
    let organization = state.guard.require_organization(&user, organization_id)?;

    let organization = state
        .store
        .rename_organization(organization.id, payload.name.trim().to_string())?;

    info!(
        organization_id = organization.id,
        name = %organization.name,
        updated_by = user.id,
        "Organization renamed"
    );
    Ok(Json(OrganizationResponse::describe(
        state.store.as_ref(),
        organization,
    )?))
}

#[utoipa::path(
    delete,
    path = "/organizations/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = i32, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization deleted", body = MessageResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Organization not found", body = crate::error::ApiError),
        (status = 412, description = "Organization still has users or projects", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(organization_id): Path<i32>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .resolver
        .require_permission(&user, "organizations.delete")?;
    let organization = state.guard.require_organization(&user, organization_id)?;

    state.store.delete_organization(organization.id)?;

    info!(
        organization_id = organization.id,
        deleted_by = user.id,
        "Organization deleted"
    );
    Ok(Json(MessageResponse::new(
        "Organization deleted successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/organizations/{organization_id}/users",
    tag = "Organizations",
    params(("organization_id" = i32, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Member users", body = Vec<UserSummary>),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Organization not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn organization_users(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(organization_id): Path<i32>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let organization = state.guard.require_organization(&user, organization_id)?;
    Ok(Json(members(state.store.as_ref(), organization.id)?))
}

#[utoipa::path(
    get,
    path = "/organizations/{organization_id}/projects",
    tag = "Organizations",
    params(
        ("organization_id" = i32, Path, description = "Organization id"),
        PaginationParams,
        ProjectQuery
    ),
    responses(
        (status = 200, description = "Projects of the organization", body = ProjectListResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Organization not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn organization_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(organization_id): Path<i32>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<Json<ProjectListResponse>> {
    let organization = state.guard.require_organization(&user, organization_id)?;
    let filter = query.refine(ProjectFilter::in_organization(organization.id));
    Ok(Json(project_page(state.store.as_ref(), &filter, pagination)?))
}
