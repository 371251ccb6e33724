use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{AppError, StoreError};
use crate::models::Role;
use crate::store::Store;

/// Membership lookups over roles and their explicit grants.
///
/// Holds no policy: the system-role bypass is applied by
/// [`PermissionResolver`](super::PermissionResolver).
#[derive(Clone)]
pub struct RoleGraph {
    store: Arc<dyn Store>,
}

impl RoleGraph {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `None` when the id does not reference a role.
    pub fn role(&self, role_id: i32) -> Result<Option<Role>, AppError> {
        match self.store.get_role(role_id) {
            Ok(role) => Ok(Some(role)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_system_role(&self, role_id: i32) -> Result<bool, AppError> {
        Ok(self.role(role_id)?.is_some_and(|r| r.is_system))
    }

    pub fn permissions_of_role(&self, role_id: i32) -> Result<BTreeSet<String>, AppError> {
        Ok(self
            .store
            .permissions_of_role(role_id)?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    /// Every permission name currently in the catalog.
    pub fn catalog(&self) -> Result<BTreeSet<String>, AppError> {
        Ok(self
            .store
            .list_permissions()?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPermission, NewRole};
    use crate::store::MemoryStore;

    #[test]
    fn test_graph_lookups() {
        let store = Arc::new(MemoryStore::new());
        let read = store
            .create_permission(NewPermission {
                name: "projects.read".to_string(),
                description: None,
            })
            .unwrap();
        let viewer = store
            .create_role(
                NewRole {
                    name: "viewer".to_string(),
                    is_system: false,
                },
                &[read.id],
            )
            .unwrap();
        let root = store
            .create_role(
                NewRole {
                    name: "root".to_string(),
                    is_system: true,
                },
                &[],
            )
            .unwrap();

        let graph = RoleGraph::new(store);
        assert!(!graph.is_system_role(viewer.id).unwrap());
        assert!(graph.is_system_role(root.id).unwrap());
        assert!(!graph.is_system_role(404).unwrap());
        assert!(graph.role(404).unwrap().is_none());
        assert_eq!(
            graph.permissions_of_role(viewer.id).unwrap(),
            BTreeSet::from(["projects.read".to_string()])
        );
        assert!(graph.permissions_of_role(root.id).unwrap().is_empty());
        assert_eq!(graph.catalog().unwrap().len(), 1);
    }
}
