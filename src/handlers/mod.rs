//! HTTP request handlers.

pub mod auth;
pub mod health;
pub mod organizations;
pub mod permissions;
pub mod projects;
pub mod roles;
pub mod teams;
pub mod users;

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{AppError, StoreError};
use crate::store::Store;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Project deleted successfully")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Memoized display names for response bodies. A dangling reference
/// resolves to `None` rather than failing the request.
pub(crate) struct Names<'a> {
    store: &'a dyn Store,
    users: HashMap<i32, Option<String>>,
    roles: HashMap<i32, Option<String>>,
    organizations: HashMap<i32, Option<String>>,
}

fn optional<T>(result: Result<T, StoreError>) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl<'a> Names<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            users: HashMap::new(),
            roles: HashMap::new(),
            organizations: HashMap::new(),
        }
    }

    pub fn user(&mut self, id: i32) -> Result<Option<String>, AppError> {
        if let Some(name) = self.users.get(&id) {
            return Ok(name.clone());
        }
        let name = optional(self.store.get_user(id))?.map(|u| u.username);
        self.users.insert(id, name.clone());
        Ok(name)
    }

    pub fn role(&mut self, id: Option<i32>) -> Result<Option<String>, AppError> {
        let Some(id) = id else { return Ok(None) };
        if let Some(name) = self.roles.get(&id) {
            return Ok(name.clone());
        }
        let name = optional(self.store.get_role(id))?.map(|r| r.name);
        self.roles.insert(id, name.clone());
        Ok(name)
    }

    pub fn organization(&mut self, id: Option<i32>) -> Result<Option<String>, AppError> {
        let Some(id) = id else { return Ok(None) };
        if let Some(name) = self.organizations.get(&id) {
            return Ok(name.clone());
        }
        let name = optional(self.store.get_organization(id))?.map(|o| o.name);
        self.organizations.insert(id, name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewOrganization, NewRole, NewUser};
    use crate::store::MemoryStore;

    #[test]
    fn test_names_resolve_and_tolerate_dangling_ids() {
        let store = MemoryStore::new();
        let org = store
            .create_organization(NewOrganization {
                name: "Acme".to_string(),
            })
            .unwrap();
        let role = store
            .create_role(
                NewRole {
                    name: "viewer".to_string(),
                    is_system: false,
                },
                &[],
            )
            .unwrap();
        let user = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "x".to_string(),
                role_id: Some(role.id),
                organization_id: Some(org.id),
                is_active: true,
            })
            .unwrap();

        let mut names = Names::new(&store);
        assert_eq!(names.user(user.id).unwrap().as_deref(), Some("alice"));
        assert_eq!(names.role(Some(role.id)).unwrap().as_deref(), Some("viewer"));
        assert_eq!(
            names.organization(Some(org.id)).unwrap().as_deref(),
            Some("Acme")
        );
        assert_eq!(names.user(999).unwrap(), None);
        assert_eq!(names.role(None).unwrap(), None);
    }
}
