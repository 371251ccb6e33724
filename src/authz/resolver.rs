//! Answers "may this user do that" by walking the role graph.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use super::RoleGraph;
use crate::error::AppError;
use crate::models::User;
use crate::store::Store;
use crate::telemetry::record_permission_check;

/// Role id that a fresh database assigns to the seeded `admin` role. Holders
/// are administrators by id equality alone, outside the permission graph.
pub const LEGACY_ADMIN_ROLE_ID: i32 = 2;

/// Permission that makes its holder an administrator.
pub const SYSTEM_ADMIN: &str = "system.admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// The user has no role, or the role no longer exists.
    NoRole,
    /// The role is flagged system and holds every permission.
    SystemRole,
    GrantedByRole,
    NotGranted,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::NoRole => "no_role",
            DecisionReason::SystemRole => "system_role",
            DecisionReason::GrantedByRole => "granted_by_role",
            DecisionReason::NotGranted => "not_granted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub granted: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn grant(reason: DecisionReason) -> Self {
        Self {
            granted: true,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            granted: false,
            reason,
        }
    }
}

/// Permission resolution. Every call reads the store; nothing is cached, so
/// a new grant or a new catalog entry applies on the next check.
#[derive(Clone)]
pub struct PermissionResolver {
    graph: RoleGraph,
    legacy_admin_role_id: Option<i32>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn Store>, legacy_admin_role_id: Option<i32>) -> Self {
        Self {
            graph: RoleGraph::new(store),
            legacy_admin_role_id,
        }
    }

    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    /// Resolves `permission` for `user` and reports which path decided it.
    ///
    /// A system role grants any name, including names absent from the
    /// catalog. Otherwise the name must match an explicit grant exactly.
    pub fn check(&self, user: &User, permission: &str) -> Result<Decision, AppError> {
        let start = Instant::now();
        let decision = self.decide(user, permission)?;
        record_permission_check(decision.reason, decision.granted, start.elapsed());

        debug!(
            user_id = user.id,
            permission = %permission,
            granted = decision.granted,
            reason = decision.reason.as_str(),
            "Permission check"
        );
        Ok(decision)
    }

    fn decide(&self, user: &User, permission: &str) -> Result<Decision, AppError> {
        let Some(role_id) = user.role_id else {
            return Ok(Decision::deny(DecisionReason::NoRole));
        };
        let Some(role) = self.graph.role(role_id)? else {
            return Ok(Decision::deny(DecisionReason::NoRole));
        };
        if role.is_system {
            return Ok(Decision::grant(DecisionReason::SystemRole));
        }

        if self.graph.permissions_of_role(role.id)?.contains(permission) {
            Ok(Decision::grant(DecisionReason::GrantedByRole))
        } else {
            Ok(Decision::deny(DecisionReason::NotGranted))
        }
    }

    pub fn has_permission(&self, user: &User, permission: &str) -> Result<bool, AppError> {
        Ok(self.check(user, permission)?.granted)
    }

    /// The full current catalog for system roles, the explicit grants
    /// otherwise.
    pub fn all_permissions(&self, user: &User) -> Result<BTreeSet<String>, AppError> {
        let Some(role_id) = user.role_id else {
            return Ok(BTreeSet::new());
        };
        match self.graph.role(role_id)? {
            None => Ok(BTreeSet::new()),
            Some(role) if role.is_system => self.graph.catalog(),
            Some(role) => self.graph.permissions_of_role(role.id),
        }
    }

    /// True when the user holds the legacy admin role id.
    pub fn is_legacy_admin(&self, user: &User) -> bool {
        self.legacy_admin_role_id
            .is_some_and(|id| user.role_id == Some(id))
    }

    pub fn is_admin(&self, user: &User) -> Result<bool, AppError> {
        if self.is_legacy_admin(user) {
            return Ok(true);
        }
        self.has_permission(user, SYSTEM_ADMIN)
    }

    pub fn require_permission(&self, user: &User, permission: &str) -> Result<(), AppError> {
        if self.has_permission(user, permission)? {
            Ok(())
        } else {
            Err(AppError::forbidden("Not enough permissions"))
        }
    }

    pub fn require_admin(&self, user: &User) -> Result<(), AppError> {
        if self.is_admin(user)? {
            Ok(())
        } else {
            Err(AppError::forbidden("Admin access required"))
        }
    }
}
