//! Project team handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, ApiResult},
    handlers::{users::UserSummary, MessageResponse},
    middleware::CurrentUser,
    models::TeamMembership,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddTeamMemberRequest {
    pub user_id: i32,
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/team",
    tag = "Teams",
    params(("project_id" = i32, Path, description = "Project id")),
    responses(
        (status = 200, description = "Team roster", body = Vec<UserSummary>),
        (status = 403, description = "Not allowed to view this team", body = crate::error::ApiError),
        (status = 404, description = "Project not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_team(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<i32>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let project = state.store.get_project(project_id)?;
    if !state.guard.can_access_team(&user, &project)? {
        return Err(AppError::forbidden("Not enough permissions").into());
    }

    let members = state.store.list_team(project.id)?;
    Ok(Json(members.into_iter().map(UserSummary::from).collect()))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/team",
    tag = "Teams",
    params(("project_id" = i32, Path, description = "Project id")),
    request_body = AddTeamMemberRequest,
    responses(
        (status = 201, description = "Member added", body = TeamMembership),
        (status = 403, description = "Candidate inactive or outside the project's organization", body = crate::error::ApiError),
        (status = 404, description = "Project or user not found", body = crate::error::ApiError),
        (status = 409, description = "Already a team member", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_team_member(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<i32>,
    Json(payload): Json<AddTeamMemberRequest>,
) -> ApiResult<(StatusCode, Json<TeamMembership>)> {
    state.resolver.require_permission(&user, "projects.update")?;
    let membership = state
        .guard
        .add_team_member(&user, project_id, payload.user_id)?;
    Ok((StatusCode::CREATED, Json(membership)))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/team/{user_id}",
    tag = "Teams",
    params(
        ("project_id" = i32, Path, description = "Project id"),
        ("user_id" = i32, Path, description = "Member user id")
    ),
    responses(
        (status = 200, description = "Member removed", body = MessageResponse),
        (status = 403, description = "Not enough permissions", body = crate::error::ApiError),
        (status = 404, description = "Project or team member not found", body = crate::error::ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_team_member(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((project_id, member_id)): Path<(i32, i32)>,
) -> ApiResult<Json<MessageResponse>> {
    state.resolver.require_permission(&user, "projects.update")?;
    state
        .guard
        .remove_team_member(&user, project_id, member_id)?;
    Ok(Json(MessageResponse::new("Team member removed successfully")))
}
