use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: Option<i32>,
    pub organization_id: Option<i32>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<i32>,
    pub organization_id: Option<i32>,
    pub is_active: bool,
}

/// Partial update of a user record. `None` leaves a column untouched;
/// `Some(None)` clears a nullable reference.
#[derive(Debug, AsChangeset, Default, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role_id: Option<Option<i32>>,
    pub organization_id: Option<Option<i32>>,
    pub is_active: Option<bool>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role_id.is_none()
            && self.organization_id.is_none()
            && self.is_active.is_none()
    }

    /// True when the change touches fields only an administrator may set.
    pub fn is_privileged(&self) -> bool {
        self.role_id.is_some() || self.organization_id.is_some() || self.is_active.is_some()
    }
}

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq, Eq, ToSchema)]
#[diesel(table_name = crate::schema::roles)]
pub struct Role {
    pub id: i32,
    #[schema(example = "project_manager")]
    pub name: String,
    pub is_system: bool,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::roles)]
pub struct NewRole {
    pub name: String,
    pub is_system: bool,
}

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq, Eq, ToSchema)]
#[diesel(table_name = crate::schema::permissions)]
pub struct Permission {
    pub id: i32,
    #[schema(example = "projects.create")]
    pub name: String,
    #[schema(example = "Create new projects")]
    pub description: Option<String>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::permissions)]
pub struct NewPermission {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Insertable, Clone, Copy, PartialEq, Eq, Hash)]
#[diesel(table_name = crate::schema::role_permissions)]
pub struct RolePermission {
    pub role_id: i32,
    pub permission_id: i32,
}

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq, Eq, ToSchema)]
#[diesel(table_name = crate::schema::organizations)]
pub struct Organization {
    pub id: i32,
    #[schema(example = "Acme Corp")]
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::organizations)]
pub struct NewOrganization {
    pub name: String,
}

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone, PartialEq, Eq, ToSchema)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: i32,
    #[schema(example = "Website relaunch")]
    pub name: String,
    #[schema(example = "Rebuild the marketing site")]
    pub description: Option<String>,
    pub owner_id: i32,
    pub organization_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::projects)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i32,
    pub organization_id: i32,
}

#[derive(Debug, AsChangeset, Default, Clone)]
#[diesel(table_name = crate::schema::projects)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, PartialEq, Eq, ToSchema)]
#[diesel(table_name = crate::schema::project_team)]
pub struct TeamMembership {
    pub project_id: i32,
    pub user_id: i32,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone, Copy)]
#[diesel(table_name = crate::schema::project_team)]
pub struct NewTeamMembership {
    pub project_id: i32,
    pub user_id: i32,
}
