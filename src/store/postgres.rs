use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::{ProjectFilter, ProjectSort, Store, StoreError, StoreResult, UserFilter};
use crate::models::{
    NewOrganization, NewPermission, NewProject, NewRole, NewTeamMembership, NewUser,
    Organization, Permission, Project, ProjectChanges, Role, RolePermission, TeamMembership, User,
    UserChanges,
};
use crate::pagination::Page;
use crate::schema::{
    organizations, permissions, project_team, projects, role_permissions, roles, users,
};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound("record"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(conflict_subject(info.constraint_name()).to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                StoreError::NotFound(missing_reference(info.constraint_name()))
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

fn conflict_subject(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_username_key") => "username",
        Some("users_email_key") => "email",
        Some("roles_name_key") => "role name",
        Some("permissions_name_key") => "permission name",
        Some("organizations_name_key") => "organization name",
        Some("project_team_pkey") => "team membership",
        Some("role_permissions_pkey") => "permission grant",
        _ => "record",
    }
}

fn missing_reference(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_role_id_fkey") | Some("role_permissions_role_id_fkey") => "role",
        Some("role_permissions_permission_id_fkey") => "permission",
        Some("users_organization_id_fkey") | Some("projects_organization_id_fkey") => {
            "organization"
        }
        Some("projects_owner_id_fkey") => "owner",
        Some("project_team_user_id_fkey") => "user",
        Some("project_team_project_id_fkey") => "project",
        _ => "referenced record",
    }
}

fn project_query(filter: &ProjectFilter) -> projects::BoxedQuery<'static, Pg> {
    let mut query = projects::table.into_boxed();

    if let Some(org) = filter.organization_id {
        query = query.filter(projects::organization_id.eq(org));
    }
    if let Some(member) = filter.member_id {
        let assigned = project_team::table
            .filter(project_team::user_id.eq(member))
            .select(project_team::project_id);
        query = query.filter(projects::id.eq_any(assigned));
    }
    if let Some(term) = filter.search_term() {
        let pattern = format!("%{}%", term);
        let owners = users::table
            .filter(users::username.ilike(pattern.clone()))
            .select(users::id);
        query = query.filter(
            projects::name
                .ilike(pattern.clone())
                .or(projects::description.ilike(pattern))
                .or(projects::owner_id.eq_any(owners)),
        );
    }
    query
}

/// PostgreSQL store over an r2d2 pool. Multi-row writes run in a single
/// transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<DbConn> {
        self.pool
            .get()
            .map_err(|e| StoreError::Backend(format!("connection pool: {}", e)))
    }

    fn replace_grants(
        conn: &mut PgConnection,
        role_id: i32,
        permission_ids: &[i32],
    ) -> StoreResult<()> {
        diesel::delete(role_permissions::table.filter(role_permissions::role_id.eq(role_id)))
            .execute(conn)?;

        let known: Vec<i32> = permissions::table
            .filter(permissions::id.eq_any(permission_ids.to_vec()))
            .select(permissions::id)
            .load(conn)?;
        if known.is_empty() {
            return Ok(());
        }

        let grants: Vec<RolePermission> = known
            .into_iter()
            .map(|permission_id| RolePermission {
                role_id,
                permission_id,
            })
            .collect();
        diesel::insert_into(role_permissions::table)
            .values(&grants)
            .on_conflict_do_nothing()
            .execute(conn)?;
        Ok(())
    }
}

impl Store for PgStore {
    fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn get_user(&self, id: i32) -> StoreResult<User> {
        let mut conn = self.conn()?;
        users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("user"))
    }

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_users(&self, filter: &UserFilter, page: Page) -> StoreResult<Vec<User>> {
        let mut conn = self.conn()?;
        let mut query = users::table.into_boxed();
        if let Some(org) = filter.organization_id {
            query = query.filter(users::organization_id.eq(org));
        }
        Ok(query
            .order(users::id.asc())
            .limit(page.limit)
            .offset(page.offset)
            .load::<User>(&mut conn)?)
    }

    fn count_users(&self, filter: &UserFilter) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        let count = match filter.organization_id {
            Some(org) => users::table
                .filter(users::organization_id.eq(org))
                .count()
                .get_result(&mut conn)?,
            None => users::table.count().get_result(&mut conn)?,
        };
        Ok(count)
    }

    fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<User> {
        if changes.is_empty() {
            return self.get_user(id);
        }
        let mut conn = self.conn()?;
        diesel::update(users::table.find(id))
            .set(&changes)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("user"))
    }

    fn delete_user(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            users::table
                .find(id)
                .select(users::id)
                .for_update()
                .first::<i32>(conn)
                .optional()?
                .ok_or(StoreError::NotFound("user"))?;

            let owned: i64 = projects::table
                .filter(projects::owner_id.eq(id))
                .count()
                .get_result(conn)?;
            if owned > 0 {
                return Err(StoreError::InUse {
                    entity: "user",
                    referrer: "owned projects",
                    count: owned,
                });
            }

            diesel::delete(project_team::table.filter(project_team::user_id.eq(id)))
                .execute(conn)?;
            diesel::delete(users::table.find(id)).execute(conn)?;
            Ok(())
        })
    }

    fn get_role(&self, id: i32) -> StoreResult<Role> {
        let mut conn = self.conn()?;
        roles::table
            .find(id)
            .select(Role::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("role"))
    }

    fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let mut conn = self.conn()?;
        Ok(roles::table
            .filter(roles::name.eq(name))
            .select(Role::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut conn = self.conn()?;
        Ok(roles::table
            .order(roles::id.asc())
            .select(Role::as_select())
            .load(&mut conn)?)
    }

    fn create_role(&self, role: NewRole, permission_ids: &[i32]) -> StoreResult<Role> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let created: Role = diesel::insert_into(roles::table)
                .values(&role)
                .returning(Role::as_returning())
                .get_result(conn)?;
            Self::replace_grants(conn, created.id, permission_ids)?;
            Ok(created)
        })
    }

    fn update_role(
        &self,
        id: i32,
        name: Option<String>,
        permission_ids: Option<&[i32]>,
    ) -> StoreResult<Role> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let mut role: Role = roles::table
                .find(id)
                .select(Role::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .ok_or(StoreError::NotFound("role"))?;
            if role.is_system {
                return Err(StoreError::Protected(
                    "System roles cannot be modified".to_string(),
                ));
            }

            if let Some(name) = name {
                role = diesel::update(roles::table.find(id))
                    .set(roles::name.eq(name))
                    .returning(Role::as_returning())
                    .get_result(conn)?;
            }
            if let Some(ids) = permission_ids {
                Self::replace_grants(conn, id, ids)?;
            }
            Ok(role)
        })
    }

    fn delete_role(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let role: Role = roles::table
                .find(id)
                .select(Role::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .ok_or(StoreError::NotFound("role"))?;
            if role.is_system {
                return Err(StoreError::Protected(
                    "System roles cannot be deleted".to_string(),
                ));
            }

            let holders: i64 = users::table
                .filter(users::role_id.eq(id))
                .count()
                .get_result(conn)?;
            if holders > 0 {
                return Err(StoreError::InUse {
                    entity: "role",
                    referrer: "users",
                    count: holders,
                });
            }

            diesel::delete(role_permissions::table.filter(role_permissions::role_id.eq(id)))
                .execute(conn)?;
            diesel::delete(roles::table.find(id)).execute(conn)?;
            Ok(())
        })
    }

    fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let mut conn = self.conn()?;
        Ok(permissions::table
            .order(permissions::name.asc())
            .select(Permission::as_select())
            .load(&mut conn)?)
    }

    fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        let mut conn = self.conn()?;
        Ok(permissions::table
            .filter(permissions::name.eq(name))
            .select(Permission::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(permissions::table)
            .values(&permission)
            .returning(Permission::as_returning())
            .get_result(&mut conn)?)
    }

    fn permissions_of_role(&self, role_id: i32) -> StoreResult<Vec<Permission>> {
        let mut conn = self.conn()?;
        Ok(role_permissions::table
            .inner_join(permissions::table)
            .filter(role_permissions::role_id.eq(role_id))
            .order(permissions::name.asc())
            .select(Permission::as_select())
            .load(&mut conn)?)
    }

    fn grant_permission(&self, role_id: i32, permission_id: i32) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let inserted = diesel::insert_into(role_permissions::table)
            .values(&RolePermission {
                role_id,
                permission_id,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(inserted > 0)
    }

    fn get_organization(&self, id: i32) -> StoreResult<Organization> {
        let mut conn = self.conn()?;
        organizations::table
            .find(id)
            .select(Organization::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("organization"))
    }

    fn find_organization_by_name(&self, name: &str) -> StoreResult<Option<Organization>> {
        let mut conn = self.conn()?;
        Ok(organizations::table
            .filter(organizations::name.eq(name))
            .select(Organization::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_organizations(&self, page: Page) -> StoreResult<Vec<Organization>> {
        let mut conn = self.conn()?;
        Ok(organizations::table
            .order(organizations::id.asc())
            .limit(page.limit)
            .offset(page.offset)
            .select(Organization::as_select())
            .load(&mut conn)?)
    }

    fn count_organizations(&self) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        Ok(organizations::table.count().get_result(&mut conn)?)
    }

    fn create_organization(&self, organization: NewOrganization) -> StoreResult<Organization> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(organizations::table)
            .values(&organization)
            .returning(Organization::as_returning())
            .get_result(&mut conn)?)
    }

    fn rename_organization(&self, id: i32, name: String) -> StoreResult<Organization> {
        let mut conn = self.conn()?;
        diesel::update(organizations::table.find(id))
            .set(organizations::name.eq(name))
            .returning(Organization::as_returning())
            .get_result(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("organization"))
    }

    fn delete_organization(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            organizations::table
                .find(id)
                .select(organizations::id)
                .for_update()
                .first::<i32>(conn)
                .optional()?
                .ok_or(StoreError::NotFound("organization"))?;

            let members: i64 = users::table
                .filter(users::organization_id.eq(id))
                .count()
                .get_result(conn)?;
            if members > 0 {
                return Err(StoreError::InUse {
                    entity: "organization",
                    referrer: "users",
                    count: members,
                });
            }

            let owned: i64 = projects::table
                .filter(projects::organization_id.eq(id))
                .count()
                .get_result(conn)?;
            if owned > 0 {
                return Err(StoreError::InUse {
                    entity: "organization",
                    referrer: "projects",
                    count: owned,
                });
            }

            diesel::delete(organizations::table.find(id)).execute(conn)?;
            Ok(())
        })
    }

    fn get_project(&self, id: i32) -> StoreResult<Project> {
        let mut conn = self.conn()?;
        projects::table
            .find(id)
            .select(Project::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("project"))
    }

    fn list_projects(&self, filter: &ProjectFilter, page: Page) -> StoreResult<Vec<Project>> {
        let mut conn = self.conn()?;
        let query = match filter.sort {
            ProjectSort::Date => project_query(filter)
                .order((projects::created_at.desc(), projects::id.desc())),
            ProjectSort::Name => {
                project_query(filter).order((projects::name.asc(), projects::id.asc()))
            }
        };
        Ok(query
            .limit(page.limit)
            .offset(page.offset)
            .load::<Project>(&mut conn)?)
    }

    fn count_projects(&self, filter: &ProjectFilter) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        Ok(project_query(filter).count().get_result(&mut conn)?)
    }

    fn create_project(&self, project: NewProject) -> StoreResult<Project> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            users::table
                .find(project.owner_id)
                .select(users::id)
                .first::<i32>(conn)
                .optional()?
                .ok_or(StoreError::NotFound("owner"))?;
            organizations::table
                .find(project.organization_id)
                .select(organizations::id)
                .first::<i32>(conn)
                .optional()?
                .ok_or(StoreError::NotFound("organization"))?;

            Ok(diesel::insert_into(projects::table)
                .values(&project)
                .returning(Project::as_returning())
                .get_result(conn)?)
        })
    }

    fn update_project(&self, id: i32, changes: ProjectChanges) -> StoreResult<Project> {
        if changes.name.is_none() && changes.description.is_none() {
            return self.get_project(id);
        }
        let mut conn = self.conn()?;
        diesel::update(projects::table.find(id))
            .set(&changes)
            .returning(Project::as_returning())
            .get_result(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("project"))
    }

    fn delete_project(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            diesel::delete(project_team::table.filter(project_team::project_id.eq(id)))
                .execute(conn)?;
            let deleted = diesel::delete(projects::table.find(id)).execute(conn)?;
            if deleted == 0 {
                return Err(StoreError::NotFound("project"));
            }
            Ok(())
        })
    }

    fn list_team(&self, project_id: i32) -> StoreResult<Vec<User>> {
        let mut conn = self.conn()?;
        projects::table
            .find(project_id)
            .select(projects::id)
            .first::<i32>(&mut conn)
            .optional()?
            .ok_or(StoreError::NotFound("project"))?;

        Ok(project_team::table
            .inner_join(users::table)
            .filter(project_team::project_id.eq(project_id))
            .order(project_team::added_at.asc())
            .select(User::as_select())
            .load(&mut conn)?)
    }

    fn is_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let count: i64 = project_team::table
            .filter(project_team::project_id.eq(project_id))
            .filter(project_team::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    fn add_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<TeamMembership> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            projects::table
                .find(project_id)
                .select(projects::id)
                .first::<i32>(conn)
                .optional()?
                .ok_or(StoreError::NotFound("project"))?;
            users::table
                .find(user_id)
                .select(users::id)
                .first::<i32>(conn)
                .optional()?
                .ok_or(StoreError::NotFound("user"))?;

            Ok(diesel::insert_into(project_team::table)
                .values(&NewTeamMembership {
                    project_id,
                    user_id,
                })
                .returning(TeamMembership::as_returning())
                .get_result(conn)?)
        })
    }

    fn remove_team_member(&self, project_id: i32, user_id: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let removed = diesel::delete(
            project_team::table
                .filter(project_team::project_id.eq(project_id))
                .filter(project_team::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;
        if removed == 0 {
            return Err(StoreError::NotFound("team member"));
        }
        Ok(())
    }
}
