//! Startup seeding of the permission catalog and the default roles.

use std::collections::HashMap;

use tracing::info;

use crate::error::AppError;
use crate::models::{NewOrganization, NewPermission, NewRole};
use crate::store::Store;

pub const PERMISSION_CATALOG: &[(&str, &str)] = &[
    ("users.create", "Create new users"),
    ("users.read", "View user information"),
    ("users.update", "Edit user information"),
    ("users.delete", "Delete users"),
    ("projects.create", "Create new projects"),
    ("projects.read", "View project information"),
    ("projects.update", "Edit project information"),
    ("projects.delete", "Delete projects"),
    ("organizations.create", "Create new organizations"),
    ("organizations.read", "View organization information"),
    ("organizations.update", "Edit organization information"),
    ("organizations.delete", "Delete organizations"),
    ("roles.create", "Create new roles"),
    ("roles.read", "View role information"),
    ("roles.update", "Edit role information"),
    ("roles.delete", "Delete roles"),
    ("reports.view", "View reports and analytics"),
    ("reports.export", "Export reports and data"),
    ("system.admin", "Full system administration access"),
    ("settings.update", "Update system settings"),
];

#[derive(Debug, Clone, Copy)]
pub struct DefaultRole {
    pub name: &'static str,
    pub is_system: bool,
    /// `None` grants the whole catalog.
    pub permissions: Option<&'static [&'static str]>,
}

/// Creation order matters: on an empty database `admin` receives id 2.
pub const DEFAULT_ROLES: &[DefaultRole] = &[
    DefaultRole {
        name: "user",
        is_system: false,
        permissions: Some(&["projects.read", "users.read"]),
    },
    DefaultRole {
        name: "admin",
        is_system: true,
        permissions: None,
    },
    DefaultRole {
        name: "project_manager",
        is_system: false,
        permissions: Some(&[
            "projects.create",
            "projects.read",
            "projects.update",
            "projects.delete",
            "users.read",
            "organizations.read",
            "reports.view",
        ]),
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub organization_created: bool,
}

impl SeedReport {
    pub fn is_noop(&self) -> bool {
        self.permissions_created == 0 && self.roles_created == 0 && !self.organization_created
    }
}

/// Creates whatever part of the catalog, the default roles and the default
/// organization is missing. Existing rows are left untouched, so running
/// it again changes nothing.
pub fn seed_defaults(store: &dyn Store, default_organization: &str) -> Result<SeedReport, AppError> {
    let mut report = SeedReport::default();

    for (name, description) in PERMISSION_CATALOG {
        if store.find_permission_by_name(name)?.is_none() {
            store.create_permission(NewPermission {
                name: name.to_string(),
                description: Some(description.to_string()),
            })?;
            report.permissions_created += 1;
        }
    }

    let ids: HashMap<String, i32> = store
        .list_permissions()?
        .into_iter()
        .map(|p| (p.name, p.id))
        .collect();

    for role in DEFAULT_ROLES {
        if store.find_role_by_name(role.name)?.is_some() {
            continue;
        }
        let grants: Vec<i32> = match role.permissions {
            Some(names) => names.iter().filter_map(|n| ids.get(*n).copied()).collect(),
            None => PERMISSION_CATALOG
                .iter()
                .filter_map(|(n, _)| ids.get(*n).copied())
                .collect(),
        };
        let created = store.create_role(
            NewRole {
                name: role.name.to_string(),
                is_system: role.is_system,
            },
            &grants,
        )?;
        info!(
            role_id = created.id,
            role = %created.name,
            grants = grants.len(),
            "Seeded role"
        );
        report.roles_created += 1;
    }

    if store.count_organizations()? == 0 {
        let org = store.create_organization(NewOrganization {
            name: default_organization.to_string(),
        })?;
        info!(organization_id = org.id, name = %org.name, "Seeded default organization");
        report.organization_created = true;
    }

    Ok(report)
}
