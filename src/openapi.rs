//! OpenAPI document served through Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{auth, health, organizations, permissions, projects, roles, teams, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warden API",
        version = "1.0.0",
        description = "Multi-tenant role-based access control.\n\n\
        ## Authentication\n\
        1. Register or log in to obtain an access token\n\
        2. Send it on every protected request: `Authorization: Bearer <token>`\n\
        3. Log in again once it expires; there is no refresh flow\n\n\
        ## Authorization\n\
        Each role carries a set of named permissions such as `projects.create`. \
        System roles hold every permission. Organizations scope users, projects \
        and teams; only administrators see across them.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Authentication", description = "Registration and login"),
        (name = "Users", description = "The caller's profile, permissions and projects"),
        (name = "User Administration", description = "Organization-scoped user management"),
        (name = "Organizations", description = "Tenant management"),
        (name = "Projects", description = "Organization-scoped projects"),
        (name = "Teams", description = "Project team membership"),
        (name = "Roles", description = "Roles and their permission grants"),
        (name = "Permissions", description = "Permission catalog and decision diagnostics")
    ),
    paths(
        health::health_check,
        health::ready_check,
        health::live_check,

        auth::register,
        auth::login,

        users::get_me,
        users::update_me,
        users::my_permissions,
        users::my_projects,
        users::my_project,
        users::my_organization_projects,
        users::my_organization_stats,
        users::list_users,
        users::create_user,
        users::update_user,
        users::delete_user,

        organizations::list_organizations,
        organizations::create_organization,
        organizations::get_organization,
        organizations::update_organization,
        organizations::delete_organization,
        organizations::organization_users,
        organizations::organization_projects,

        projects::list_projects,
        projects::create_project,
        projects::project_stats,
        projects::get_project,
        projects::update_project,
        projects::delete_project,

        teams::list_team,
        teams::add_team_member,
        teams::remove_team_member,

        roles::list_roles,
        roles::create_role,
        roles::update_role,
        roles::delete_role,

        permissions::list_permissions,
        permissions::check_permission,
        permissions::check_permissions_bulk,
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::pagination::PaginationMeta,
            crate::handlers::MessageResponse,

            health::HealthResponse,
            health::ReadinessResponse,
            health::ComponentStatus,

            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthResponse,

            users::UserResponse,
            users::UserSummary,
            users::UserListResponse,
            users::MyPermissionsResponse,
            users::UpdateProfileRequest,
            users::CreateUserRequest,
            users::UpdateUserRequest,

            organizations::OrganizationResponse,
            organizations::OrganizationDetail,
            organizations::OrganizationListResponse,
            organizations::OrganizationRequest,

            crate::store::ProjectSort,
            projects::ProjectStatus,
            projects::ProjectResponse,
            projects::ProjectListResponse,
            projects::ProjectStats,
            projects::CreateProjectRequest,
            projects::UpdateProjectRequest,

            crate::models::TeamMembership,
            teams::AddTeamMemberRequest,

            crate::models::Role,
            roles::CreateRoleRequest,
            roles::UpdateRoleRequest,
            roles::RoleResponse,

            crate::models::Permission,
            crate::authz::DecisionReason,
            permissions::CheckPermissionRequest,
            permissions::CheckPermissionResponse,
            permissions::CheckPermissionsBulkRequest,
            permissions::CheckPermissionsBulkResponse,
            permissions::BulkPermissionResult,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "HS256 access token from /auth/login or /auth/register.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
