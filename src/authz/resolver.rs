use sqlx::SqlitePool;
use uuid::Uuid;

use super::policy::ProjectRole;
use crate::db::projects;
use crate::errors::AppResult;
use crate::models::project::{Project, ProjectMember};

/// Effective role of `user_id` in `project`.
///
/// Ownership always wins, even over a membership row that says otherwise.
pub fn resolve_role(project: &Project, members: &[ProjectMember], user_id: Uuid) -> Option<ProjectRole> {
    if project.owner_id == user_id {
        return Some(ProjectRole::Admin);
    }

    members
        .iter()
        .find(|member| member.project_id == project.id && member.user_id == user_id)
        .map(|member| member.role)
}

/// Loads project state and resolves roles against it.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    pool: SqlitePool,
}

impl RoleResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `Err(NotFound)` when the project does not exist; `Ok(None)` when the
    /// user holds no role in it.
    pub async fn resolve(&self, user_id: Uuid, project_id: Uuid) -> AppResult<Option<ProjectRole>> {
        let project = projects::fetch_project(&self.pool, project_id).await?;
        let members: Vec<ProjectMember> = projects::find_member(&self.pool, project_id, user_id)
            .await?
            .into_iter()
            .collect();
        Ok(resolve_role(&project, &members, user_id))
    }
}
