use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDateTime, Utc};

use super::{ProjectFilter, ProjectSort, Store, StoreError, StoreResult, UserFilter};
use crate::models::{
    NewOrganization, NewPermission, NewProject, NewRole, NewUser, Organization, Permission,
    Project, ProjectChanges, Role, TeamMembership, User, UserChanges,
};
use crate::pagination::Page;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    roles: BTreeMap<i32, Role>,
    permissions: BTreeMap<i32, Permission>,
    grants: BTreeSet<(i32, i32)>,
    organizations: BTreeMap<i32, Organization>,
    projects: BTreeMap<i32, Project>,
    team: BTreeMap<(i32, i32), NaiveDateTime>,
    last_id: LastIds,
}

#[derive(Debug, Default)]
struct LastIds {
    user: i32,
    role: i32,
    permission: i32,
    organization: i32,
    project: i32,
}

fn next(seq: &mut i32) -> i32 {
    *seq += 1;
    *seq
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl Tables {
    fn check_user_unique(&self, id: Option<i32>, username: &str, email: &str) -> StoreResult<()> {
        for user in self.users.values().filter(|u| Some(u.id) != id) {
            if user.username == username {
                return Err(StoreError::Conflict("username".to_string()));
            }
            if user.email == email {
                return Err(StoreError::Conflict("email".to_string()));
            }
        }
        Ok(())
    }

    fn check_role_name_unique(&self, id: Option<i32>, name: &str) -> StoreResult<()> {
        if self
            .roles
            .values()
            .any(|r| r.name == name && Some(r.id) != id)
        {
            return Err(StoreError::Conflict("role name".to_string()));
        }
        Ok(())
    }

    fn check_organization_name_unique(&self, id: Option<i32>, name: &str) -> StoreResult<()> {
        if self
            .organizations
            .values()
            .any(|o| o.name == name && Some(o.id) != id)
        {
            return Err(StoreError::Conflict("organization name".to_string()));
        }
        Ok(())
    }

    fn check_references(&self, role_id: Option<i32>, organization_id: Option<i32>) -> StoreResult<()> {
        if let Some(role_id) = role_id {
            if !self.roles.contains_key(&role_id) {
                return Err(StoreError::NotFound("role"));
            }
        }
        if let Some(org_id) = organization_id {
            if !self.organizations.contains_key(&org_id) {
                return Err(StoreError::NotFound("organization"));
            }
        }
        Ok(())
    }

    fn replace_grants(&mut self, role_id: i32, permission_ids: &[i32]) {
        self.grants.retain(|(role, _)| *role != role_id);
        for permission_id in permission_ids {
            if self.permissions.contains_key(permission_id) {
                self.grants.insert((role_id, *permission_id));
            }
        }
    }

    fn project_matches(&self, filter: &ProjectFilter, term: Option<&str>, project: &Project) -> bool {
        if let Some(org) = filter.organization_id {
            if project.organization_id != org {
                return false;
            }
        }
        if let Some(member) = filter.member_id {
            if !self.team.contains_key(&(project.id, member)) {
                return false;
            }
        }
        if let Some(term) = term {
            let owner = self
                .users
                .get(&project.owner_id)
                .map(|u| u.username.to_lowercase())
                .unwrap_or_default();
            let hit = project.name.to_lowercase().contains(term)
                || project
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(term))
                || owner.contains(term);
            if !hit {
                return false;
            }
        }
        true
    }

    fn filtered_projects(&self, filter: &ProjectFilter) -> Vec<Project> {
        let term = filter.search_term();
        let mut found: Vec<Project> = self
            .projects
            .values()
            .filter(|p| self.project_matches(filter, term.as_deref(), p))
            .cloned()
            .collect();
        match filter.sort {
            ProjectSort::Date => {
                found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
            ProjectSort::Name => found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        }
        found
    }
}

/// In-memory store with the same uniqueness and guard semantics as
/// [`PgStore`](super::PgStore).
///
/// Intended for tests and local runs. A single lock covers every table, so
/// each trait method is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn ping(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }

    fn get_user(&self, id: i32) -> StoreResult<User> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn list_users(&self, filter: &UserFilter, page: Page) -> StoreResult<Vec<User>> {
        let tables = self.read()?;
        let users = tables
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        Ok(page.slice(users))
    }

    fn count_users(&self, filter: &UserFilter) -> StoreResult<i64> {
        Ok(self.read()?.users.values().filter(|u| filter.matches(u)).count() as i64)
    }

    fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.write()?;
        tables.check_user_unique(None, &user.username, &user.email)?;
        tables.check_references(user.role_id, user.organization_id)?;

        let id = next(&mut tables.last_id.user);
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            organization_id: user.organization_id,
            is_active: user.is_active,
            created_at: now(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<User> {
        let mut tables = self.write()?;
        let mut user = tables
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))?;

        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(role_id) = changes.role_id {
            user.role_id = role_id;
        }
        if let Some(org_id) = changes.organization_id {
            user.organization_id = org_id;
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }

        tables.check_user_unique(Some(id), &user.username, &user.email)?;
        tables.check_references(user.role_id, user.organization_id)?;
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    fn delete_user(&self, id: i32) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&id) {
            return Err(StoreError::NotFound("user"));
        }
        let owned = tables.projects.values().filter(|p| p.owner_id == id).count() as i64;
        if owned > 0 {
            return Err(StoreError::InUse {
                entity: "user",
                referrer: "owned projects",
                count: owned,
            });
        }
        tables.team.retain(|(_, user_id), _| *user_id != id);
        tables.users.remove(&id);
        Ok(())
    }

    fn get_role(&self, id: i32) -> StoreResult<Role> {
        self.read()?
            .roles
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("role"))
    }

    fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.values().find(|r| r.name == name).cloned())
    }

    fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(self.read()?.roles.values().cloned().collect())
    }

    fn create_role(&self, role: NewRole, permission_ids: &[i32]) -> StoreResult<Role> {
        let mut tables = self.write()?;
        tables.check_role_name_unique(None, &role.name)?;

        let id = next(&mut tables.last_id.role);
        let created = Role {
            id,
            name: role.name,
            is_system: role.is_system,
        };
        tables.roles.insert(id, created.clone());
        tables.replace_grants(id, permission_ids);
        Ok(created)
    }

    fn update_role(
        &self,
        id: i32,
        name: Option<String>,
        permission_ids: Option<&[i32]>,
    ) -> StoreResult<Role> {
        let mut tables = self.write()?;
        let mut role = tables
            .roles
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("role"))?;
        if role.is_system {
            return Err(StoreError::Protected(
                "System roles cannot be modified".to_string(),
            ));
        }

        if let Some(name) = name {
            tables.check_role_name_unique(Some(id), &name)?;
            role.name = name;
        }
        tables.roles.insert(id, role.clone());
        if let Some(ids) = permission_ids {
            tables.replace_grants(id, ids);
        }
        Ok(role)
    }

    fn delete_role(&self, id: i32) -> StoreResult<()> {
        let mut tables = self.write()?;
        let role = tables.roles.get(&id).ok_or(StoreError::NotFound("role"))?;
        if role.is_system {
            return Err(StoreError::Protected(
                "System roles cannot be deleted".to_string(),
            ));
        }
        let holders = tables
            .users
            .values()
            .filter(|u| u.role_id == Some(id))
            .count() as i64;
        if holders > 0 {
            return Err(StoreError::InUse {
                entity: "role",
                referrer: "users",
                count: holders,
            });
        }
        tables.grants.retain(|(role_id, _)| *role_id != id);
        tables.roles.remove(&id);
        Ok(())
    }

    fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let mut all: Vec<Permission> = self.read()?.permissions.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        Ok(self
            .read()?
            .permissions
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let mut tables = self.write()?;
        if tables.permissions.values().any(|p| p.name == permission.name) {
            return Err(StoreError::Conflict("permission name".to_string()));
        }
        let id = next(&mut tables.last_id.permission);
        let created = Permission {
            id,
            name: permission.name,
            description: permission.description,
        };
        tables.permissions.insert(id, created.clone());
        Ok(created)
    }

    fn permissions_of_role(&self, role_id: i32) -> StoreResult<Vec<Permission>> {
        let tables = self.read()?;
        let mut granted: Vec<Permission> = tables
            .grants
            .iter()
            .filter(|(role, _)| *role == role_id)
            .filter_map(|(_, permission_id)| tables.permissions.get(permission_id).cloned())
            .collect();
        granted.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(granted)
    }

    fn grant_permission(&self, role_id: i32, permission_id: i32) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if !tables.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound("role"));
        }
        if !tables.permissions.contains_key(&permission_id) {
            return Err(StoreError::NotFound("permission"));
        }
        Ok(tables.grants.insert((role_id, permission_id)))
    }

    fn get_organization(&self, id: i32) -> StoreResult<Organization> {
        self.read()?
            .organizations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("organization"))
    }

    fn find_organization_by_name(&self, name: &str) -> StoreResult<Option<Organization>> {
        Ok(self
            .read()?
            .organizations
            .values()
            .find(|o| o.name == name)
            .cloned())
    }

    fn list_organizations(&self, page: Page) -> StoreResult<Vec<Organization>> {
        let all = self.read()?.organizations.values().cloned().collect();
        Ok(page.slice(all))
    }

    fn count_organizations(&self) -> StoreResult<i64> {
        Ok(self.read()?.organizations.len() as i64)
    }

    fn create_organization(&self, organization: NewOrganization) -> StoreResult<Organization> {
        let mut tables = self.write()?;
        tables.check_organization_name_unique(None, &organization.name)?;
        let id = next(&mut tables.last_id.organization);
        let created = Organization {
            id,
            name: organization.name,
            created_at: now(),
        };
        tables.organizations.insert(id, created.clone());
        Ok(created)
    }

    fn rename_organization(&self, id: i32, name: String) -> StoreResult<Organization> {
        let mut tables = self.write()?;
        tables.check_organization_name_unique(Some(id), &name)?;
        let org = tables
            .organizations
            .get_mut(&id)
            .ok_or(StoreError::NotFound("organization"))?;
        org.name = name;
        Ok(org.clone())
    }

    fn delete_organization(&self, id: i32) -> StoreResult<()> {
        let mut tables = self.write()?;
        if !tables.organizations.contains_key(&id) {
            return Err(StoreError::NotFound("organization"));
        }
        let members = tables
            .users
            .values()
            .filter(|u| u.organization_id == Some(id))
            .count() as i64;
        if members > 0 {
            return Err(StoreError::InUse {
                entity: "organization",
                referrer: "users",
                count: members,
            });
        }
        let projects = tables
            .projects
            .values()
            .filter(|p| p.organization_id == id)
            .count() as i64;
        if projects > 0 {
            return Err(StoreError::InUse {
                entity: "organization",
                referrer: "projects",
                count: projects,
            });
        }
        tables.organizations.remove(&id);
        Ok(())
    }

    fn get_project(&self, id: i32) -> StoreResult<Project> {
        self.read()?
            .projects
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("project"))
    }

    fn list_projects(&self, filter: &ProjectFilter, page: Page) -> StoreResult<Vec<Project>> {
        Ok(page.slice(self.read()?.filtered_projects(filter)))
    }

    fn count_projects(&self, filter: &ProjectFilter) -> StoreResult<i64> {
        Ok(self.read()?.filtered_projects(filter).len() as i64)
    }

    fn create_project(&self, project: NewProject) -> StoreResult<Project> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&project.owner_id) {
            return Err(StoreError::NotFound("owner"));
        }
        if !tables.organizations.contains_key(&project.organization_id) {
            return Err(StoreError::NotFound("organization"));
        }
        let id = next(&mut tables.last_id.project);
        let created = Project {
            id,
            name: project.name,
            description: project.description,
            owner_id: project.owner_id,
            organization_id: project.organization_id,
            created_at: now(),
        };
        tables.projects.insert(id, created.clone());
        Ok(created)
    }

    fn update_project(&self, id: i32, changes: ProjectChanges) -> StoreResult<Project> {
        let mut tables = self.write()?;
        let project = tables
            .projects
            .get_mut(&id)
            .ok_or(StoreError::NotFound("project"))?;
        if let Some(name) = changes.name {
            project.name = name;
        }
        if let Some(description) = changes.description {
            project.description = description;
        }
        Ok(project.clone())
    }

    fn delete_project(&self, id: i32) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.projects.remove(&id).is_none() {
            return Err(StoreError::NotFound("project"));
        }
        tables.team.retain(|(project_id, _), _| *project_id != id);
        Ok(())
    }

    fn list_team(&self, project_id: i32) -> StoreResult<Vec<User>> {
        let tables = self.read()?;
        if !tables.projects.contains_key(&project_id) {
            return Err(StoreError::NotFound("project"));
        }
        Ok(tables
            .team
            .keys()
            .filter(|(project, _)| *project == project_id)
            .filter_map(|(_, user_id)| tables.users.get(user_id).cloned())
            .collect())
    }

    fn is_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<bool> {
        Ok(self.read()?.team.contains_key(&(project_id, user_id)))
    }

    fn add_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<TeamMembership> {
        let mut tables = self.write()?;
        if !tables.projects.contains_key(&project_id) {
            return Err(StoreError::NotFound("project"));
        }
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("user"));
        }
        if tables.team.contains_key(&(project_id, user_id)) {
            return Err(StoreError::Conflict("team membership".to_string()));
        }
        let added_at = now();
        tables.team.insert((project_id, user_id), added_at);
        Ok(TeamMembership {
            project_id,
            user_id,
            added_at,
        })
    }

    fn remove_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables
            .team
            .remove(&(project_id, user_id))
            .map(|_| ())
            .ok_or(StoreError::NotFound("team member"))
    }
}
