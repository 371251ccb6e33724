//! Tenant scoping: keeps organizations, projects and teams inside the
//! caller's organization unless the caller is an administrator.

use std::sync::Arc;

use tracing::{info, warn};

use super::PermissionResolver;
use crate::error::{AppError, StoreError};
use crate::models::{Organization, Project, TeamMembership, User};
use crate::pagination::Page;
use crate::store::{ProjectFilter, Store, UserFilter};

const NO_ORGANIZATION: &str = "User is not associated with any organization";
const NOT_ACCESSIBLE: &str = "Project not found or not accessible";

/// Per-request predicates over current persisted state. Holds no state of
/// its own between calls.
#[derive(Clone)]
pub struct TenantGuard {
    store: Arc<dyn Store>,
    resolver: PermissionResolver,
    default_organization_id: i32,
}

impl TenantGuard {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: PermissionResolver,
        default_organization_id: i32,
    ) -> Self {
        Self {
            store,
            resolver,
            default_organization_id,
        }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn can_access_organization(&self, user: &User, organization_id: i32) -> Result<bool, AppError> {
        if user.organization_id == Some(organization_id) {
            return Ok(true);
        }
        self.resolver.is_admin(user)
    }

    /// Loads an organization the user may read. Non-admins asking for a
    /// foreign organization get `Forbidden` whether or not it exists.
    pub fn require_organization(
        &self,
        user: &User,
        organization_id: i32,
    ) -> Result<Organization, AppError> {
        if !self.can_access_organization(user, organization_id)? {
            warn!(
                user_id = user.id,
                organization_id, "Cross-organization access denied"
            );
            return Err(AppError::forbidden("Not enough permissions"));
        }
        Ok(self.store.get_organization(organization_id)?)
    }

    /// Users visible to `user`: everyone for admins, otherwise the members
    /// of the caller's organization.
    pub fn organization_scope(&self, user: &User) -> Result<UserFilter, AppError> {
        if self.resolver.is_admin(user)? {
            return Ok(UserFilter::default());
        }
        user.organization_id
            .map(UserFilter::in_organization)
            .ok_or_else(|| AppError::forbidden(NO_ORGANIZATION))
    }

    /// Projects visible to `user`: everything for admins, otherwise the
    /// caller's organization.
    pub fn project_scope(&self, user: &User) -> Result<ProjectFilter, AppError> {
        if self.resolver.is_admin(user)? {
            return Ok(ProjectFilter::default());
        }
        user.organization_id
            .map(ProjectFilter::in_organization)
            .ok_or_else(|| AppError::forbidden(NO_ORGANIZATION))
    }

    pub fn can_access_project(&self, user: &User, project: &Project) -> Result<bool, AppError> {
        if user.organization_id == Some(project.organization_id) {
            return Ok(true);
        }
        self.resolver.is_admin(user)
    }

    pub fn require_project(&self, user: &User, project_id: i32) -> Result<Project, AppError> {
        let project = self.store.get_project(project_id)?;
        if !self.can_access_project(user, &project)? {
            warn!(user_id = user.id, project_id, "Cross-organization project access denied");
            return Err(AppError::forbidden("Not enough permissions"));
        }
        Ok(project)
    }

    /// Team rosters are visible to admins, to the project's owner and team,
    /// and to organization members holding `projects.read`.
    pub fn can_access_team(&self, user: &User, project: &Project) -> Result<bool, AppError> {
        if self.resolver.is_admin(user)? {
            return Ok(true);
        }
        if user.organization_id != Some(project.organization_id) {
            return Ok(false);
        }
        if project.owner_id == user.id || self.store.is_team_member(project.id, user.id)? {
            return Ok(true);
        }
        self.resolver.has_permission(user, "projects.read")
    }

    /// Organization a new project created by `actor` lands in.
    pub fn project_organization_for(&self, actor: &User) -> i32 {
        actor
            .organization_id
            .unwrap_or(self.default_organization_id)
    }

    /// A team candidate must be active and share the project's organization.
    pub fn check_team_candidate(&self, project: &Project, candidate: &User) -> Result<(), AppError> {
        if !candidate.is_active {
            return Err(AppError::forbidden("User account is inactive"));
        }
        if candidate.organization_id != Some(project.organization_id) {
            return Err(AppError::forbidden(
                "User does not belong to the project's organization",
            ));
        }
        Ok(())
    }

    /// Adds `candidate_id` to the team of a project `actor` can access.
    /// A duplicate pair is a `Conflict`.
    pub fn add_team_member(
        &self,
        actor: &User,
        project_id: i32,
        candidate_id: i32,
    ) -> Result<TeamMembership, AppError> {
        let project = self.require_project(actor, project_id)?;
        let candidate = self.store.get_user(candidate_id)?;
        self.check_team_candidate(&project, &candidate)?;

        let membership = self.store.add_team_member(project.id, candidate.id)?;
        info!(
            project_id = project.id,
            user_id = candidate.id,
            added_by = actor.id,
            "Added team member"
        );
        Ok(membership)
    }

    pub fn remove_team_member(
        &self,
        actor: &User,
        project_id: i32,
        member_id: i32,
    ) -> Result<(), AppError> {
        let project = self.require_project(actor, project_id)?;
        self.store.remove_team_member(project.id, member_id)?;
        info!(
            project_id = project.id,
            user_id = member_id,
            removed_by = actor.id,
            "Removed team member"
        );
        Ok(())
    }

    fn assigned_filter(&self, user: &User, base: ProjectFilter) -> Option<ProjectFilter> {
        let organization_id = user.organization_id?;
        Some(ProjectFilter {
            organization_id: Some(organization_id),
            member_id: Some(user.id),
            ..base
        })
    }

    /// Projects whose team includes `user`, restricted to the user's own
    /// organization. `base` contributes search and sort only.
    pub fn assigned_projects(
        &self,
        user: &User,
        base: ProjectFilter,
        page: Page,
    ) -> Result<(Vec<Project>, i64), AppError> {
        let Some(filter) = self.assigned_filter(user, base) else {
            return Ok((Vec::new(), 0));
        };
        let total = self.store.count_projects(&filter)?;
        let projects = self.store.list_projects(&filter, page)?;
        Ok((projects, total))
    }

    /// A single assigned project. Anything outside the assignment is
    /// reported as not found.
    pub fn assigned_project(&self, user: &User, project_id: i32) -> Result<Project, AppError> {
        let project = match self.store.get_project(project_id) {
            Ok(project) => project,
            Err(StoreError::NotFound(_)) => return Err(AppError::not_found(NOT_ACCESSIBLE)),
            Err(e) => return Err(e.into()),
        };
        let in_org = user.organization_id == Some(project.organization_id);
        if !in_org || !self.store.is_team_member(project.id, user.id)? {
            return Err(AppError::not_found(NOT_ACCESSIBLE));
        }
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::LEGACY_ADMIN_ROLE_ID;
    use crate::models::{NewOrganization, NewPermission, NewProject, NewRole, NewUser};
    use crate::store::MemoryStore;

    struct World {
        store: Arc<MemoryStore>,
        guard: TenantGuard,
        acme: i32,
        globex: i32,
        admin: User,
        alice: User,
        bob: User,
        carol: User,
    }

    fn world() -> World {
        let store = Arc::new(MemoryStore::new());
        let read = store
            .create_permission(NewPermission {
                name: "projects.read".to_string(),
                description: None,
            })
            .unwrap();
        let user_role = store
            .create_role(
                NewRole {
                    name: "user".to_string(),
                    is_system: false,
                },
                &[read.id],
            )
            .unwrap();
        let admin_role = store
            .create_role(
                NewRole {
                    name: "admin".to_string(),
                    is_system: true,
                },
                &[],
            )
            .unwrap();
        assert_eq!(admin_role.id, LEGACY_ADMIN_ROLE_ID);

        let acme = store
            .create_organization(NewOrganization {
                name: "Acme".to_string(),
            })
            .unwrap()
            .id;
        let globex = store
            .create_organization(NewOrganization {
                name: "Globex".to_string(),
            })
            .unwrap()
            .id;

        let make = |name: &str, role: Option<i32>, org: Option<i32>, active: bool| {
            store
                .create_user(NewUser {
                    username: name.to_string(),
                    email: format!("{}@example.com", name),
                    password_hash: "x".to_string(),
                    role_id: role,
                    organization_id: org,
                    is_active: active,
                })
                .unwrap()
        };
        let admin = make("admin", Some(admin_role.id), None, true);
        let alice = make("alice", Some(user_role.id), Some(acme), true);
        let bob = make("bob", Some(user_role.id), Some(globex), true);
        let carol = make("carol", None, Some(acme), true);

        let resolver = PermissionResolver::new(store.clone(), Some(LEGACY_ADMIN_ROLE_ID));
        let guard = TenantGuard::new(store.clone(), resolver, 1);
        World {
            store,
            guard,
            acme,
            globex,
            admin,
            alice,
            bob,
            carol,
        }
    }

    fn project(w: &World, owner: &User, org: i32) -> Project {
        w.store
            .create_project(NewProject {
                name: format!("{} project", owner.username),
                description: None,
                owner_id: owner.id,
                organization_id: org,
            })
            .unwrap()
    }

    #[test]
    fn test_organization_access() {
        let w = world();
        assert!(w.guard.can_access_organization(&w.alice, w.acme).unwrap());
        assert!(!w.guard.can_access_organization(&w.alice, w.globex).unwrap());
        assert!(w.guard.can_access_organization(&w.admin, w.globex).unwrap());

        assert!(matches!(
            w.guard.require_organization(&w.alice, w.globex),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            w.guard.require_organization(&w.alice, 999),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            w.guard.require_organization(&w.admin, 999),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            w.guard.require_organization(&w.alice, w.acme).unwrap().name,
            "Acme"
        );
    }

    #[test]
    fn test_scopes() {
        let w = world();
        assert_eq!(
            w.guard.organization_scope(&w.alice).unwrap(),
            UserFilter::in_organization(w.acme)
        );
        assert_eq!(
            w.guard.organization_scope(&w.admin).unwrap(),
            UserFilter::default()
        );
        assert_eq!(
            w.guard.project_scope(&w.bob).unwrap().organization_id,
            Some(w.globex)
        );

        let mut loner = w.alice.clone();
        loner.organization_id = None;
        assert!(matches!(
            w.guard.project_scope(&loner),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_project_access() {
        let w = world();
        let acme_project = project(&w, &w.alice, w.acme);

        assert!(w.guard.require_project(&w.carol, acme_project.id).is_ok());
        assert!(matches!(
            w.guard.require_project(&w.bob, acme_project.id),
            Err(AppError::Forbidden(_))
        ));
        assert!(w.guard.require_project(&w.admin, acme_project.id).is_ok());
        assert!(matches!(
            w.guard.require_project(&w.admin, 999),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_project_organization_fallback() {
        let w = world();
        assert_eq!(w.guard.project_organization_for(&w.admin), 1);
        assert_eq!(w.guard.project_organization_for(&w.bob), w.globex);
    }

    #[test]
    fn test_team_candidate_rules() {
        let w = world();
        let p = project(&w, &w.alice, w.acme);

        assert!(matches!(
            w.guard.add_team_member(&w.alice, p.id, w.bob.id),
            Err(AppError::Forbidden(_))
        ));

        w.store
            .update_user(
                w.carol.id,
                crate::models::UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            w.guard.add_team_member(&w.alice, p.id, w.carol.id),
            Err(AppError::Forbidden(_))
        ));

        assert!(matches!(
            w.guard.add_team_member(&w.alice, p.id, 999),
            Err(AppError::NotFound(_))
        ));

        w.guard.add_team_member(&w.alice, p.id, w.alice.id).unwrap();
        assert!(matches!(
            w.guard.add_team_member(&w.alice, p.id, w.alice.id),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_team_visibility() {
        let w = world();
        let p = project(&w, &w.alice, w.acme);

        assert!(w.guard.can_access_team(&w.alice, &p).unwrap());
        assert!(w.guard.can_access_team(&w.admin, &p).unwrap());
        assert!(!w.guard.can_access_team(&w.bob, &p).unwrap());
        // carol has no role, so only membership opens the roster
        assert!(!w.guard.can_access_team(&w.carol, &p).unwrap());
        w.store.add_team_member(p.id, w.carol.id).unwrap();
        assert!(w.guard.can_access_team(&w.carol, &p).unwrap());
    }

    #[test]
    fn test_assigned_projects_intersect_organization() {
        let w = world();
        let mine = project(&w, &w.alice, w.acme);
        let other = project(&w, &w.alice, w.acme);
        let foreign = project(&w, &w.bob, w.globex);

        w.store.add_team_member(mine.id, w.carol.id).unwrap();
        // A stray cross-organization row must not leak through.
        w.store.add_team_member(foreign.id, w.carol.id).unwrap();

        let (found, total) = w
            .guard
            .assigned_projects(&w.carol, ProjectFilter::default(), Page::ALL)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, mine.id);

        assert_eq!(w.guard.assigned_project(&w.carol, mine.id).unwrap().id, mine.id);
        assert!(matches!(
            w.guard.assigned_project(&w.carol, other.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            w.guard.assigned_project(&w.carol, foreign.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            w.guard.assigned_project(&w.carol, 999),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_team_member() {
        let w = world();
        let p = project(&w, &w.alice, w.acme);
        w.store.add_team_member(p.id, w.carol.id).unwrap();

        w.guard.remove_team_member(&w.alice, p.id, w.carol.id).unwrap();
        assert!(matches!(
            w.guard.remove_team_member(&w.alice, p.id, w.carol.id),
            Err(AppError::NotFound(_))
        ));
    }
}
