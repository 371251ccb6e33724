//! Project handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, ApiResult},
    handlers::{MessageResponse, Names},
    middleware::CurrentUser,
    models::{NewProject, Project, ProjectChanges},
    pagination::{Page, PaginationMeta, PaginationParams},
    store::{ProjectFilter, ProjectSort, Store},
    AppState,
};

/// Lifecycle stage derived from a project's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum ProjectStatus {
    Active,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl ProjectStatus {
    /// Up to 30 whole days is `Active`, up to 90 `In Progress`, older is
    /// `Completed`.
    pub fn at(created_at: NaiveDateTime, now: NaiveDateTime) -> Self {
        match (now - created_at).num_days() {
            d if d > 90 => ProjectStatus::Completed,
            d if d > 30 => ProjectStatus::InProgress,
            _ => ProjectStatus::Active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: i32,
    #[schema(example = "Website relaunch")]
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub owner_id: i32,
    #[schema(example = "alice")]
    pub owner: Option<String>,
    pub organization_id: i32,
    #[schema(example = "Acme Corp")]
    pub organization: Option<String>,
    pub created_at: NaiveDateTime,
}

impl ProjectResponse {
    pub(crate) fn describe(
        project: Project,
        names: &mut Names<'_>,
        now: NaiveDateTime,
    ) -> Result<Self, AppError> {
        Ok(Self {
            status: ProjectStatus::at(project.created_at, now),
            owner: names.user(project.owner_id)?,
            organization: names.organization(Some(project.organization_id))?,
            id: project.id,
            name: project.name,
            description: project.description,
            owner_id: project.owner_id,
            organization_id: project.organization_id,
            created_at: project.created_at,
        })
    }

    pub(crate) fn describe_one(store: &dyn Store, project: Project) -> Result<Self, AppError> {
        Self::describe(project, &mut Names::new(store), Utc::now().naive_utc())
    }

    pub(crate) fn describe_all(
        store: &dyn Store,
        projects: Vec<Project>,
    ) -> Result<Vec<Self>, AppError> {
        let now = Utc::now().naive_utc();
        let mut names = Names::new(store);
        projects
            .into_iter()
            .map(|p| Self::describe(p, &mut names, now))
            .collect()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<ProjectResponse>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ProjectStats {
    pub total_projects: i64,
    pub active_projects: i64,
    pub in_progress_projects: i64,
    pub completed_projects: i64,
    /// Organization the figures cover; absent for the global view.
    pub organization_id: Option<i32>,
}

impl ProjectStats {
    pub fn tally(projects: &[Project], organization_id: Option<i32>, now: NaiveDateTime) -> Self {
        let mut stats = Self {
            organization_id,
            ..Self::default()
        };
        for project in projects {
            stats.total_projects += 1;
            match ProjectStatus::at(project.created_at, now) {
                ProjectStatus::Active => stats.active_projects += 1,
                ProjectStatus::InProgress => stats.in_progress_projects += 1,
                ProjectStatus::Completed => stats.completed_projects += 1,
            }
        }
        stats
    }

    pub(crate) fn for_filter(store: &dyn Store, filter: &ProjectFilter) -> Result<Self, AppError> {
        let projects = store.list_projects(filter, Page::ALL)?;
        Ok(Self::tally(
            &projects,
            filter.organization_id,
            Utc::now().naive_utc(),
        ))
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectQuery {
    /// Case-insensitive match on name, description or owner username.
    pub search: Option<String>,
    /// `date` (newest first, default) or `name`.
    pub sort: Option<ProjectSort>,
}

impl ProjectQuery {
    pub fn refine(self, filter: ProjectFilter) -> ProjectFilter {
        ProjectFilter {
            search: self.search,
            sort: self.sort.unwrap_or_default(),
            ..filter
        }
    }
}

/// Runs a filtered, paginated listing.
pub(crate) fn project_page(
    store: &dyn Store,
    filter: &ProjectFilter,
    pagination: PaginationParams,
) -> Result<ProjectListResponse, AppError> {
    let total = store.count_projects(filter)?;
    let projects = store.list_projects(filter, pagination.window())?;
    Ok(ProjectListResponse {
        data: ProjectResponse::describe_all(store, projects)?,
        pagination: pagination.into_metadata(total),
    })
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Project name must be 1-100 characters"))]
    #[schema(example = "Website relaunch")]
    pub name: String,
    #[schema(example = "Rebuild the marketing site")]
    pub description: Option<String>,
    /// Defaults to the caller.
    pub owner_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Project name must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    params(PaginationParams, ProjectQuery),
    responses(
        (status = 200, description = "Projects visible to the caller", body = ProjectListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<Json<ProjectListResponse>> {
    state.resolver.require_permission(&user, "projects.read")?;
    let filter = query.refine(state.guard.project_scope(&user)?);
    Ok(Json(project_page(state.store.as_ref(), &filter, pagination)?))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Owner not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectResponse>)> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_permission(&user, "projects.create")?;

    let organization_id = state.guard.project_organization_for(&user);
    let owner_id = match payload.owner_id {
        None => user.id,
        Some(id) if id == user.id => id,
        Some(id) => {
            let owner = state.store.get_user(id)?;
            if owner.organization_id != Some(organization_id)
                && !state.resolver.is_admin(&user)?
            {
                return Err(AppError::forbidden(
                    "Owner does not belong to your organization",
                )
                .into());
            }
            owner.id
        }
    };

    let project = state.store.create_project(NewProject {
        name: payload.name.trim().to_string(),
        description: payload.description,
        owner_id,
        organization_id,
    })?;

    info!(
        project_id = project.id,
        owner_id,
        organization_id,
        created_by = user.id,
        "Project created"
    );

    let response = ProjectResponse::describe_one(state.store.as_ref(), project)?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/projects/stats",
    tag = "Projects",
    responses(
        (status = 200, description = "Project counts by status", body = ProjectStats),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn project_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<ProjectStats>> {
    state.resolver.require_permission(&user, "projects.read")?;
    let filter = state.guard.project_scope(&user)?;
    Ok(Json(ProjectStats::for_filter(state.store.as_ref(), &filter)?))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = i32, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project", body = ProjectResponse),
        (status = 403, description = "Project belongs to another organization", body = crate::error::ApiError),
        (status = 404, description = "Project not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<i32>,
) -> ApiResult<Json<ProjectResponse>> {
    state.resolver.require_permission(&user, "projects.read")?;
    let project = state.guard.require_project(&user, project_id)?;
    let response = ProjectResponse::describe_one(state.store.as_ref(), project)?;
    Ok(Json(response))
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = i32, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectResponse),
        (status = 400, description = "Validation error", body = crate::error::ApiError),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Project not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<i32>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<ProjectResponse>> {
    payload.validate().map_err(AppError::from)?;
    state.resolver.require_permission(&user, "projects.update")?;
    let project = state.guard.require_project(&user, project_id)?;

    let changes = ProjectChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        description: payload.description.map(Some),
    };
    let project = if changes.name.is_none() && changes.description.is_none() {
        project
    } else {
        state.store.update_project(project.id, changes)?
    };

    info!(project_id = project.id, updated_by = user.id, "Project updated");
    let response = ProjectResponse::describe_one(state.store.as_ref(), project)?;
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = i32, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deleted", body = MessageResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Project not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<i32>,
) -> ApiResult<Json<MessageResponse>> {
    state.resolver.require_permission(&user, "projects.delete")?;
    let project = state.guard.require_project(&user, project_id)?;

    state.store.delete_project(project.id)?;

    info!(project_id = project.id, deleted_by = user.id, "Project deleted");
    Ok(Json(MessageResponse::new("Project deleted successfully")))
}
