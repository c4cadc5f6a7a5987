//! Authorization module - project-scoped RBAC
//!
//! - `policy`: static role -> resource -> action table
//! - `resolver`: effective role of a user inside one project (owner is admin)
//! - `gate`: combines both into an allow/deny decision for controllers
//!
//! Decisions are recomputed on every call, so membership changes apply to the
//! very next request.

mod gate;
mod policy;
mod resolver;

pub use gate::{Decision, DenialReason, PermissionGate};
pub use policy::{allows, ProjectRole, Resource, RolePolicy, StaticRolePolicy};
pub use resolver::{resolve_role, RoleResolver};

/// Well-known action names used by the permission table
pub mod actions {
    pub const VIEW: &str = "view";
    pub const CREATE: &str = "create";
    pub const EDIT: &str = "edit";
    pub const DELETE: &str = "delete";
    pub const INVITE: &str = "invite";
    pub const ASSIGN: &str = "assign";
    pub const MOVE: &str = "move";
    pub const COMMENT: &str = "comment";
    pub const ENABLE: &str = "enable";
    pub const DISABLE: &str = "disable";
}
