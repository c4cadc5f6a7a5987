use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::ProjectRole;
use crate::db::decode_json;
use crate::errors::AppError;
use crate::events::Publishable;

pub const DEFAULT_STATUSES: [&str; 3] = ["To Do", "In Progress", "Done"];

/// Status name that marks a task as finished. The due-date sweep skips it.
pub const DONE_STATUS: &str = "Done";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub theme_color: String,
    #[schema(example = json!(["To Do", "In Progress", "Done"]))]
    pub statuses: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn has_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }
}

impl Publishable for Project {
    fn entity_type() -> &'static str { "project" }
    fn subject_id(&self) -> Uuid { self.id }
    fn project_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub theme_color: String,
    pub statuses: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(value: DbProject) -> Result<Self, Self::Error> {
        Ok(Project {
            id: value.id,
            owner_id: value.owner_id,
            name: value.name,
            description: value.description,
            theme_color: value.theme_color,
            statuses: decode_json("statuses", &value.statuses)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Launch Planning")]
    pub name: String,
    #[schema(example = "Prepare milestones for the product launch.")]
    pub description: Option<String>,
    #[schema(example = "#3498db")]
    pub theme_color: Option<String>,
    pub statuses: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub theme_color: Option<String>,
    /// Replaces the status list. Existing rules are not re-validated.
    pub statuses: Option<Vec<String>>,
}

/// Validates a status list: non-empty, no blank or duplicate names.
pub fn validate_statuses(statuses: &[String]) -> Result<(), AppError> {
    if statuses.is_empty() {
        return Err(AppError::bad_request("a project needs at least one status"));
    }

    for (idx, status) in statuses.iter().enumerate() {
        if status.trim().is_empty() {
            return Err(AppError::bad_request("status names must not be blank"));
        }
        if statuses[..idx].contains(status) {
            return Err(AppError::bad_request(format!("duplicate status '{status}'")));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbProjectMember> for ProjectMember {
    type Error = AppError;

    fn try_from(value: DbProjectMember) -> Result<Self, Self::Error> {
        let role = value
            .role
            .parse::<ProjectRole>()
            .map_err(|_| AppError::internal(format!("unknown role '{}' in project_members", value.role)))?;

        Ok(ProjectMember {
            project_id: value.project_id,
            user_id: value.user_id,
            role,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberAddRequest {
    pub user_id: Uuid,
    pub role: ProjectRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberUpdateRequest {
    pub role: ProjectRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lists_reject_duplicates_and_blanks() {
        let ok = vec!["To Do".to_string(), "Done".to_string()];
        assert!(validate_statuses(&ok).is_ok());

        let dup = vec!["Done".to_string(), "Done".to_string()];
        assert!(validate_statuses(&dup).is_err());

        let blank = vec!["  ".to_string()];
        assert!(validate_statuses(&blank).is_err());

        assert!(validate_statuses(&[]).is_err());
    }
}
