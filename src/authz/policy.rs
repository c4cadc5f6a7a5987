use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::actions::*;

/// Role a user holds inside one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Admin,
    Editor,
    Viewer,
}

impl ProjectRole {
    pub const ALL: [ProjectRole; 3] = [ProjectRole::Admin, ProjectRole::Editor, ProjectRole::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Admin => "admin",
            ProjectRole::Editor => "editor",
            ProjectRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(ProjectRole::Admin),
            "editor" => Ok(ProjectRole::Editor),
            "viewer" => Ok(ProjectRole::Viewer),
            _ => Err(()),
        }
    }
}

/// Resource families guarded by the permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Project,
    Task,
    Automation,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Project => "project",
            Resource::Task => "task",
            Resource::Automation => "automation",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "project" => Ok(Resource::Project),
            "task" => Ok(Resource::Task),
            "automation" => Ok(Resource::Automation),
            _ => Err(()),
        }
    }
}

/// Pluggable role policy. The gate only ever asks this question.
pub trait RolePolicy: Send + Sync {
    fn allows(&self, role: ProjectRole, resource: Resource, action: &str) -> bool;
}

/// The built-in, immutable permission table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRolePolicy;

impl StaticRolePolicy {
    pub fn new() -> Self {
        Self
    }

    /// Allowed actions for a (role, resource) pair, in table order.
    pub fn actions_for(role: ProjectRole, resource: Resource) -> &'static [&'static str] {
        match (role, resource) {
            (ProjectRole::Admin, Resource::Project) => &[VIEW, EDIT, DELETE, INVITE],
            (ProjectRole::Admin, Resource::Task) => &[VIEW, CREATE, EDIT, DELETE, ASSIGN, MOVE, COMMENT],
            (ProjectRole::Admin, Resource::Automation) => &[VIEW, CREATE, EDIT, DELETE, ENABLE, DISABLE],

            (ProjectRole::Editor, Resource::Project) => &[VIEW],
            (ProjectRole::Editor, Resource::Task) => &[VIEW, CREATE, EDIT, DELETE, ASSIGN, MOVE, COMMENT],
            (ProjectRole::Editor, Resource::Automation) => &[VIEW, CREATE, EDIT, ENABLE, DISABLE],

            (ProjectRole::Viewer, Resource::Project) => &[VIEW],
            (ProjectRole::Viewer, Resource::Task) => &[VIEW, COMMENT],
            (ProjectRole::Viewer, Resource::Automation) => &[VIEW],
        }
    }
}

impl RolePolicy for StaticRolePolicy {
    fn allows(&self, role: ProjectRole, resource: Resource, action: &str) -> bool {
        Self::actions_for(role, resource).contains(&action)
    }
}

/// String-level lookup against the built-in table. Unknown names deny.
pub fn allows(role: &str, resource: &str, action: &str) -> bool {
    match (role.parse::<ProjectRole>(), resource.parse::<Resource>()) {
        (Ok(role), Ok(resource)) => StaticRolePolicy.allows(role, resource, action),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_do_everything_in_the_table() {
        let policy = StaticRolePolicy::new();
        for action in [VIEW, EDIT, DELETE, INVITE] {
            assert!(policy.allows(ProjectRole::Admin, Resource::Project, action));
        }
        for action in [VIEW, CREATE, EDIT, DELETE, ENABLE, DISABLE] {
            assert!(policy.allows(ProjectRole::Admin, Resource::Automation, action));
        }
    }

    #[test]
    fn editor_cannot_delete_rules_or_manage_project() {
        let policy = StaticRolePolicy::new();
        assert!(policy.allows(ProjectRole::Editor, Resource::Automation, CREATE));
        assert!(!policy.allows(ProjectRole::Editor, Resource::Automation, DELETE));
        assert!(!policy.allows(ProjectRole::Editor, Resource::Project, INVITE));
        assert!(!policy.allows(ProjectRole::Editor, Resource::Project, EDIT));
    }

    #[test]
    fn viewer_is_read_only_except_comments() {
        let policy = StaticRolePolicy::new();
        assert!(policy.allows(ProjectRole::Viewer, Resource::Task, VIEW));
        assert!(policy.allows(ProjectRole::Viewer, Resource::Task, COMMENT));
        assert!(!policy.allows(ProjectRole::Viewer, Resource::Task, EDIT));
        assert!(!policy.allows(ProjectRole::Viewer, Resource::Automation, ENABLE));
    }

    #[test]
    fn unknown_names_deny_without_error() {
        assert!(!allows("owner", "task", "view"));
        assert!(!allows("admin", "milestone", "view"));
        assert!(!allows("admin", "task", "archive"));
        assert!(allows("Admin", "task", "move"));
    }
}
