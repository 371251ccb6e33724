//! Authorization: the role/permission graph, the permission resolver and
//! the tenant scoping guard.

pub mod model;
pub mod resolver;
pub mod scope;
pub mod seed;

pub use model::RoleGraph;
pub use resolver::{
    Decision, DecisionReason, PermissionResolver, LEGACY_ADMIN_ROLE_ID, SYSTEM_ADMIN,
};
pub use scope::TenantGuard;
pub use seed::{seed_defaults, SeedReport, DEFAULT_ROLES, PERMISSION_CATALOG};
