//! Persistence interface of the authorization core.
//!
//! Every check re-reads from here; nothing above this layer caches. Guarded
//! structural mutations (role deletion, organization deletion, team adds)
//! re-validate their preconditions inside the same atomic operation that
//! performs the write.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{DbPool, PgStore};

use serde::Deserialize;
use utoipa::ToSchema;

pub use crate::error::StoreError;
use crate::models::{
    NewOrganization, NewPermission, NewProject, NewRole, NewUser, Organization, Permission,
    Project, ProjectChanges, Role, TeamMembership, User, UserChanges,
};
use crate::pagination::Page;

pub type StoreResult<T> = Result<T, StoreError>;

/// Restricts a user listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub organization_id: Option<i32>,
}

impl UserFilter {
    pub fn in_organization(organization_id: i32) -> Self {
        Self {
            organization_id: Some(organization_id),
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        match self.organization_id {
            Some(org) => user.organization_id == Some(org),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSort {
    /// Newest first.
    #[default]
    Date,
    Name,
}

/// Restricts a project listing. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub organization_id: Option<i32>,
    /// Only projects with a team row for this user.
    pub member_id: Option<i32>,
    /// Case-insensitive substring over name, description and owner username.
    pub search: Option<String>,
    pub sort: ProjectSort,
}

impl ProjectFilter {
    pub fn in_organization(organization_id: i32) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Self::default()
        }
    }

    /// Normalized search term, `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// CRUD and filtered-query access to the RBAC tables.
///
/// Implementations must keep usernames, emails, role names, permission
/// names and organization names unique, and keep `(role, permission)` and
/// `(project, user)` pairs unique.
pub trait Store: Send + Sync {
    fn ping(&self) -> StoreResult<()>;

    // Users
    fn get_user(&self, id: i32) -> StoreResult<User>;
    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    fn list_users(&self, filter: &UserFilter, page: Page) -> StoreResult<Vec<User>>;
    fn count_users(&self, filter: &UserFilter) -> StoreResult<i64>;
    fn create_user(&self, user: NewUser) -> StoreResult<User>;
    fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<User>;
    /// Fails with `InUse` while the user owns projects; team rows cascade.
    fn delete_user(&self, id: i32) -> StoreResult<()>;

    // Roles and permissions
    fn get_role(&self, id: i32) -> StoreResult<Role>;
    fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    fn list_roles(&self) -> StoreResult<Vec<Role>>;
    /// Creates the role and its grants atomically. Unknown permission ids
    /// are skipped.
    fn create_role(&self, role: NewRole, permission_ids: &[i32]) -> StoreResult<Role>;
    /// Renames and/or replaces the full grant set atomically. System roles
    /// are `Protected`.
    fn update_role(
        &self,
        id: i32,
        name: Option<String>,
        permission_ids: Option<&[i32]>,
    ) -> StoreResult<Role>;
    /// Fails with `Protected` for system roles and `InUse` while users hold
    /// the role; grants cascade.
    fn delete_role(&self, id: i32) -> StoreResult<()>;

    fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>>;
    fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission>;
    /// Permissions explicitly joined to the role, ordered by name.
    fn permissions_of_role(&self, role_id: i32) -> StoreResult<Vec<Permission>>;
    /// Adds a single grant. Returns `false` when it already existed.
    fn grant_permission(&self, role_id: i32, permission_id: i32) -> StoreResult<bool>;

    // Organizations
    fn get_organization(&self, id: i32) -> StoreResult<Organization>;
    fn find_organization_by_name(&self, name: &str) -> StoreResult<Option<Organization>>;
    fn list_organizations(&self, page: Page) -> StoreResult<Vec<Organization>>;
    fn count_organizations(&self) -> StoreResult<i64>;
    fn create_organization(&self, organization: NewOrganization) -> StoreResult<Organization>;
    fn rename_organization(&self, id: i32, name: String) -> StoreResult<Organization>;
    /// Fails with `InUse` while the organization has members or projects.
    fn delete_organization(&self, id: i32) -> StoreResult<()>;

    // Projects
    fn get_project(&self, id: i32) -> StoreResult<Project>;
    fn list_projects(&self, filter: &ProjectFilter, page: Page) -> StoreResult<Vec<Project>>;
    fn count_projects(&self, filter: &ProjectFilter) -> StoreResult<i64>;
    /// Owner and organization must exist.
    fn create_project(&self, project: NewProject) -> StoreResult<Project>;
    fn update_project(&self, id: i32, changes: ProjectChanges) -> StoreResult<Project>;
    /// Team rows cascade.
    fn delete_project(&self, id: i32) -> StoreResult<()>;

    // Project teams
    fn list_team(&self, project_id: i32) -> StoreResult<Vec<User>>;
    fn is_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<bool>;
    /// Fails with `Conflict` on a duplicate pair.
    fn add_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<TeamMembership>;
    /// Fails with `NotFound` when the pair does not exist.
    fn remove_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<()>;
}
