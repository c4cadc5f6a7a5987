use std::fmt;
use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use super::policy::{ProjectRole, Resource, RolePolicy, StaticRolePolicy};
use super::resolver::RoleResolver;
use crate::errors::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NotMember,
    InsufficientPermissions,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NotMember => f.write_str("not a project member"),
            DenialReason::InsufficientPermissions => f.write_str("insufficient permissions"),
        }
    }
}

/// Outcome of a permission check. Denial is a value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Authorized(ProjectRole),
    Denied(DenialReason),
}

impl Decision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Decision::Authorized(_))
    }

    pub fn into_result(self) -> Result<ProjectRole, DenialReason> {
        match self {
            Decision::Authorized(role) => Ok(role),
            Decision::Denied(reason) => Err(reason),
        }
    }
}

/// Guard placed in front of every mutating project, task and automation operation.
#[derive(Clone)]
pub struct PermissionGate {
    resolver: RoleResolver,
    policy: Arc<dyn RolePolicy>,
}

impl PermissionGate {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_policy(pool, Arc::new(StaticRolePolicy::new()))
    }

    pub fn with_policy(pool: SqlitePool, policy: Arc<dyn RolePolicy>) -> Self {
        Self {
            resolver: RoleResolver::new(pool),
            policy,
        }
    }

    /// Missing projects surface as `NotFound`, never as a denial.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        resource: Resource,
        action: &str,
    ) -> AppResult<Decision> {
        let decision = match self.resolver.resolve(user_id, project_id).await? {
            None => Decision::Denied(DenialReason::NotMember),
            Some(role) if !self.policy.allows(role, resource, action) => {
                Decision::Denied(DenialReason::InsufficientPermissions)
            }
            Some(role) => Decision::Authorized(role),
        };

        tracing::debug!(
            user_id = %user_id,
            project_id = %project_id,
            resource = %resource,
            action = %action,
            decision = ?decision,
            "permission check"
        );

        Ok(decision)
    }

    /// Like `authorize`, but turns a denial into `AppError::Forbidden`.
    pub async fn require(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        resource: Resource,
        action: &str,
    ) -> AppResult<ProjectRole> {
        let role = self
            .authorize(user_id, project_id, resource, action)
            .await?
            .into_result()?;
        Ok(role)
    }
}
