//! Automation rule definitions.
//!
//! Triggers and actions travel as `{ "type": ..., "condition" | "params": {...} }`
//! documents and are parsed into closed enums, so the matcher and the executor
//! can match exhaustively on them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::decode_json;
use crate::errors::AppError;
use crate::models::task::{Priority, Task};

pub const DEFAULT_NOTIFICATION_MESSAGE: &str = "An automation rule was triggered for your task";

// =============================================================================
// TRIGGER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TaskStatusChange,
    TaskAssignment,
    DueDatePassed,
    TaskCreation,
    CommentAdded,
    PriorityChange,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::TaskStatusChange => "task_status_change",
            TriggerType::TaskAssignment => "task_assignment",
            TriggerType::DueDatePassed => "due_date_passed",
            TriggerType::TaskCreation => "task_creation",
            TriggerType::CommentAdded => "comment_added",
            TriggerType::PriorityChange => "priority_change",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific trigger condition. `None` fields are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCondition {
    TaskStatusChange {
        from_status: Option<String>,
        to_status: Option<String>,
    },
    TaskAssignment {
        assignee_id: Option<Uuid>,
    },
    DueDatePassed,
    TaskCreation {
        assignee_id: Option<Uuid>,
        /// All of these must be present on the task
        tags: Vec<String>,
    },
    CommentAdded {
        author_id: Option<Uuid>,
        /// Case-insensitive substring of the comment body
        contains: Option<String>,
    },
    PriorityChange {
        from_priority: Option<Priority>,
        to_priority: Option<Priority>,
    },
}

impl TriggerCondition {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerCondition::TaskStatusChange { .. } => TriggerType::TaskStatusChange,
            TriggerCondition::TaskAssignment { .. } => TriggerType::TaskAssignment,
            TriggerCondition::DueDatePassed => TriggerType::DueDatePassed,
            TriggerCondition::TaskCreation { .. } => TriggerType::TaskCreation,
            TriggerCondition::CommentAdded { .. } => TriggerType::CommentAdded,
            TriggerCondition::PriorityChange { .. } => TriggerType::PriorityChange,
        }
    }
}

/// Boolean combinator over the task's current state, checked after the
/// type-specific condition matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conditional {
    All(Vec<Conditional>),
    Any(Vec<Conditional>),
    Not(Box<Conditional>),
    StatusIs(String),
    PriorityIs(Priority),
    HasTag(String),
    /// `null` means "unassigned"
    AssigneeIs(Option<Uuid>),
}

impl Conditional {
    pub fn evaluate(&self, task: &Task) -> bool {
        match self {
            Conditional::All(parts) => parts.iter().all(|part| part.evaluate(task)),
            Conditional::Any(parts) => parts.iter().any(|part| part.evaluate(task)),
            Conditional::Not(inner) => !inner.evaluate(task),
            Conditional::StatusIs(status) => task.status == *status,
            Conditional::PriorityIs(priority) => task.priority == *priority,
            Conditional::HasTag(tag) => task.has_tag(tag),
            Conditional::AssigneeIs(assignee) => task.assignee == *assignee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTrigger", into = "RawTrigger")]
pub struct Trigger {
    pub condition: TriggerCondition,
    pub conditional: Option<Conditional>,
}

impl Trigger {
    pub fn new(condition: TriggerCondition) -> Self {
        Self {
            condition,
            conditional: None,
        }
    }

    pub fn with_conditional(mut self, conditional: Conditional) -> Self {
        self.conditional = Some(conditional);
        self
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.condition.trigger_type()
    }
}

#[derive(Serialize, Deserialize)]
struct RawTrigger {
    #[serde(rename = "type")]
    kind: TriggerType,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    condition: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conditional: Option<Conditional>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct StatusChangeFields {
    #[serde(alias = "fromStatus")]
    from_status: Option<String>,
    #[serde(alias = "toStatus")]
    to_status: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct AssignmentFields {
    #[serde(alias = "assigneeId")]
    assignee_id: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct CreationFields {
    #[serde(alias = "assigneeId")]
    assignee_id: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct CommentFields {
    #[serde(alias = "authorId")]
    author_id: Option<String>,
    contains: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PriorityFields {
    #[serde(alias = "fromPriority")]
    from_priority: Option<String>,
    #[serde(alias = "toPriority")]
    to_priority: Option<String>,
}

impl TryFrom<RawTrigger> for Trigger {
    type Error = String;

    fn try_from(raw: RawTrigger) -> Result<Self, Self::Error> {
        let condition = match raw.kind {
            TriggerType::TaskStatusChange => {
                let fields: StatusChangeFields = condition_fields(raw.condition)?;
                TriggerCondition::TaskStatusChange {
                    from_status: wildcard(fields.from_status),
                    to_status: wildcard(fields.to_status),
                }
            }
            TriggerType::TaskAssignment => {
                let fields: AssignmentFields = condition_fields(raw.condition)?;
                TriggerCondition::TaskAssignment {
                    assignee_id: parse_uuid("assignee_id", fields.assignee_id)?,
                }
            }
            TriggerType::DueDatePassed => TriggerCondition::DueDatePassed,
            TriggerType::TaskCreation => {
                let fields: CreationFields = condition_fields(raw.condition)?;
                TriggerCondition::TaskCreation {
                    assignee_id: parse_uuid("assignee_id", fields.assignee_id)?,
                    tags: fields
                        .tags
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|tag| !tag.is_empty())
                        .collect(),
                }
            }
            TriggerType::CommentAdded => {
                let fields: CommentFields = condition_fields(raw.condition)?;
                TriggerCondition::CommentAdded {
                    author_id: parse_uuid("author_id", fields.author_id)?,
                    contains: wildcard(fields.contains),
                }
            }
            TriggerType::PriorityChange => {
                let fields: PriorityFields = condition_fields(raw.condition)?;
                TriggerCondition::PriorityChange {
                    from_priority: parse_priority(fields.from_priority)?,
                    to_priority: parse_priority(fields.to_priority)?,
                }
            }
        };

        Ok(Trigger {
            condition,
            conditional: raw.conditional,
        })
    }
}

impl From<Trigger> for RawTrigger {
    fn from(trigger: Trigger) -> Self {
        let kind = trigger.trigger_type();
        let mut fields = Map::new();

        match trigger.condition {
            TriggerCondition::TaskStatusChange { from_status, to_status } => {
                put(&mut fields, "from_status", from_status);
                put(&mut fields, "to_status", to_status);
            }
            TriggerCondition::TaskAssignment { assignee_id } => {
                put(&mut fields, "assignee_id", assignee_id.map(|id| id.to_string()));
            }
            TriggerCondition::DueDatePassed => {}
            TriggerCondition::TaskCreation { assignee_id, tags } => {
                put(&mut fields, "assignee_id", assignee_id.map(|id| id.to_string()));
                if !tags.is_empty() {
                    fields.insert("tags".to_string(), Value::from(tags));
                }
            }
            TriggerCondition::CommentAdded { author_id, contains } => {
                put(&mut fields, "author_id", author_id.map(|id| id.to_string()));
                put(&mut fields, "contains", contains);
            }
            TriggerCondition::PriorityChange { from_priority, to_priority } => {
                put(&mut fields, "from_priority", from_priority.map(|p| p.as_str().to_string()));
                put(&mut fields, "to_priority", to_priority.map(|p| p.as_str().to_string()));
            }
        }

        RawTrigger {
            kind,
            condition: if fields.is_empty() { Value::Null } else { Value::Object(fields) },
            conditional: trigger.conditional,
        }
    }
}

// =============================================================================
// ACTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum Action {
    ChangeStatus { status: String },
    AssignBadge { badge_name: String },
    SendNotification { message: Option<String> },
    /// `None` unassigns the task
    ReassignTask { assignee_id: Option<Uuid> },
    AddComment { text: String },
    ChangePriority { priority: Priority },
    ApplyLabel { label: String },
    RemoveLabel { label: String },
    /// Kept so that stored rules with an unknown action type still load
    Unsupported { kind: String, params: Value },
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Action::ChangeStatus { .. } => "change_status",
            Action::AssignBadge { .. } => "assign_badge",
            Action::SendNotification { .. } => "send_notification",
            Action::ReassignTask { .. } => "reassign_task",
            Action::AddComment { .. } => "add_comment",
            Action::ChangePriority { .. } => "change_priority",
            Action::ApplyLabel { .. } => "apply_label",
            Action::RemoveLabel { .. } => "remove_label",
            Action::Unsupported { kind, .. } => kind,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Action::Unsupported { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    params: Value,
}

#[derive(Deserialize)]
struct StatusParams {
    status: String,
}

#[derive(Deserialize)]
struct BadgeParams {
    #[serde(alias = "badgeName")]
    badge_name: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct NotificationParams {
    message: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ReassignParams {
    #[serde(alias = "assigneeId")]
    assignee_id: Option<String>,
}

#[derive(Deserialize)]
struct CommentParams {
    text: String,
}

#[derive(Deserialize)]
struct PriorityParams {
    priority: String,
}

#[derive(Deserialize)]
struct LabelParams {
    label: String,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let action = match raw.kind.as_str() {
            "change_status" => {
                let p: StatusParams = action_params(raw.params)?;
                Action::ChangeStatus {
                    status: required("status", p.status)?,
                }
            }
            "assign_badge" => {
                let p: BadgeParams = action_params(raw.params)?;
                Action::AssignBadge {
                    badge_name: required("badge_name", p.badge_name)?,
                }
            }
            "send_notification" => {
                let p: NotificationParams = action_params(raw.params)?;
                Action::SendNotification {
                    message: wildcard(p.message),
                }
            }
            "reassign_task" => {
                let p: ReassignParams = action_params(raw.params)?;
                Action::ReassignTask {
                    assignee_id: parse_uuid("assignee_id", p.assignee_id)?,
                }
            }
            "add_comment" => {
                let p: CommentParams = action_params(raw.params)?;
                Action::AddComment {
                    text: required("text", p.text)?,
                }
            }
            "change_priority" => {
                let p: PriorityParams = action_params(raw.params)?;
                Action::ChangePriority {
                    priority: p.priority.parse()?,
                }
            }
            "apply_label" => {
                let p: LabelParams = action_params(raw.params)?;
                Action::ApplyLabel {
                    label: required("label", p.label)?,
                }
            }
            "remove_label" => {
                let p: LabelParams = action_params(raw.params)?;
                Action::RemoveLabel {
                    label: required("label", p.label)?,
                }
            }
            _ => Action::Unsupported {
                kind: raw.kind,
                params: raw.params,
            },
        };

        Ok(action)
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let kind = action.kind().to_string();
        let mut params = Map::new();

        match action {
            Action::ChangeStatus { status } => put(&mut params, "status", Some(status)),
            Action::AssignBadge { badge_name } => put(&mut params, "badge_name", Some(badge_name)),
            Action::SendNotification { message } => put(&mut params, "message", message),
            Action::ReassignTask { assignee_id } => {
                params.insert(
                    "assignee_id".to_string(),
                    assignee_id.map_or(Value::Null, |id| Value::String(id.to_string())),
                );
            }
            Action::AddComment { text } => put(&mut params, "text", Some(text)),
            Action::ChangePriority { priority } => put(&mut params, "priority", Some(priority.as_str().to_string())),
            Action::ApplyLabel { label } | Action::RemoveLabel { label } => put(&mut params, "label", Some(label)),
            Action::Unsupported { params: original, .. } => {
                return RawAction { kind, params: original };
            }
        }

        RawAction {
            kind,
            params: if params.is_empty() { Value::Null } else { Value::Object(params) },
        }
    }
}

// =============================================================================
// RULE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AutomationRule {
    pub id: Uuid,
    pub project_id: Uuid,
    #[schema(example = "Award finisher badge")]
    pub name: String,
    #[schema(value_type = Object)]
    pub trigger: Trigger,
    #[schema(value_type = Object)]
    pub actions: Vec<Action>,
    pub active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAutomationRule {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub trigger_type: String,
    pub trigger: String,
    pub actions: String,
    pub active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAutomationRule> for AutomationRule {
    type Error = AppError;

    fn try_from(value: DbAutomationRule) -> Result<Self, Self::Error> {
        let trigger: Trigger = decode_json("trigger", &value.trigger)?;
        if trigger.trigger_type().as_str() != value.trigger_type {
            return Err(AppError::internal(format!(
                "automation {} has trigger_type '{}' but a '{}' trigger",
                value.id,
                value.trigger_type,
                trigger.trigger_type()
            )));
        }

        Ok(AutomationRule {
            id: value.id,
            project_id: value.project_id,
            name: value.name,
            trigger,
            actions: decode_json("actions", &value.actions)?,
            active: value.active,
            created_by: value.created_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Everything a caller supplies when defining a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    pub name: String,
    pub trigger: Trigger,
    pub actions: Vec<Action>,
    pub active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AutomationCreateRequest {
    #[schema(example = "Award finisher badge")]
    pub name: String,
    #[schema(value_type = Object, example = json!({"type": "task_status_change", "condition": {"to_status": "Done"}}))]
    pub trigger: Trigger,
    /// Single action shorthand; combined with `actions` when both are given
    #[schema(value_type = Object, example = json!({"type": "assign_badge", "params": {"badge_name": "Finisher"}}))]
    pub action: Option<Action>,
    #[schema(value_type = Object)]
    pub actions: Option<Vec<Action>>,
    pub active: Option<bool>,
}

impl AutomationCreateRequest {
    pub fn into_draft(self) -> Result<RuleDraft, AppError> {
        Ok(RuleDraft {
            name: self.name,
            trigger: self.trigger,
            actions: merge_actions(self.action, self.actions)
                .ok_or_else(|| AppError::bad_request("a rule needs at least one action"))?,
            active: self.active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AutomationUpdateRequest {
    pub name: Option<String>,
    #[schema(value_type = Object)]
    pub trigger: Option<Trigger>,
    #[schema(value_type = Object)]
    pub action: Option<Action>,
    #[schema(value_type = Object)]
    pub actions: Option<Vec<Action>>,
    pub active: Option<bool>,
}

impl AutomationUpdateRequest {
    /// Applies the provided fields on top of the stored rule.
    pub fn apply_to(self, rule: &AutomationRule) -> RuleDraft {
        RuleDraft {
            name: self.name.unwrap_or_else(|| rule.name.clone()),
            trigger: self.trigger.unwrap_or_else(|| rule.trigger.clone()),
            actions: merge_actions(self.action, self.actions).unwrap_or_else(|| rule.actions.clone()),
            active: self.active.unwrap_or(rule.active),
        }
    }
}

fn merge_actions(action: Option<Action>, actions: Option<Vec<Action>>) -> Option<Vec<Action>> {
    let merged: Vec<Action> = action.into_iter().chain(actions.unwrap_or_default()).collect();
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

// =============================================================================
// PARSING HELPERS
// =============================================================================

fn condition_fields<T: DeserializeOwned + Default>(value: Value) -> Result<T, String> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_path_to_error::deserialize(value).map_err(|err| format!("condition.{}: {}", err.path(), err.inner()))
}

fn action_params<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    let value = if value.is_null() { Value::Object(Map::new()) } else { value };
    serde_path_to_error::deserialize(value).map_err(|err| format!("params.{}: {}", err.path(), err.inner()))
}

/// Present-but-empty strings behave exactly like absent fields.
fn wildcard(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(field: &str, value: String) -> Result<String, String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(value)
}

fn parse_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, String> {
    wildcard(value)
        .map(|raw| Uuid::parse_str(&raw).map_err(|err| format!("{field}: {err}")))
        .transpose()
}

fn parse_priority(value: Option<String>) -> Result<Option<Priority>, String> {
    wildcard(value).map(|raw| raw.parse::<Priority>()).transpose()
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_condition_fields_are_wildcards() {
        let trigger: Trigger = serde_json::from_value(json!({
            "type": "task_status_change",
            "condition": { "from_status": "", "to_status": "Done" }
        }))
        .unwrap();

        assert_eq!(
            trigger.condition,
            TriggerCondition::TaskStatusChange {
                from_status: None,
                to_status: Some("Done".to_string()),
            }
        );
    }

    #[test]
    fn camel_case_fields_are_accepted() {
        let assignee = Uuid::new_v4();
        let trigger: Trigger = serde_json::from_value(json!({
            "type": "task_assignment",
            "condition": { "assigneeId": assignee.to_string() }
        }))
        .unwrap();

        assert_eq!(
            trigger.condition,
            TriggerCondition::TaskAssignment { assignee_id: Some(assignee) }
        );
    }

    #[test]
    fn due_date_trigger_needs_no_condition() {
        let trigger: Trigger = serde_json::from_value(json!({ "type": "due_date_passed" })).unwrap();
        assert_eq!(trigger.condition, TriggerCondition::DueDatePassed);
        assert_eq!(serde_json::to_value(&trigger).unwrap(), json!({ "type": "due_date_passed" }));
    }

    #[test]
    fn conditional_combinator_is_parsed_and_kept() {
        let trigger: Trigger = serde_json::from_value(json!({
            "type": "task_creation",
            "condition": { "tags": ["bug"] },
            "conditional": { "any": [ { "priority_is": "urgent" }, { "not": { "assignee_is": null } } ] }
        }))
        .unwrap();

        assert_eq!(
            trigger.conditional,
            Some(Conditional::Any(vec![
                Conditional::PriorityIs(Priority::Urgent),
                Conditional::Not(Box::new(Conditional::AssigneeIs(None))),
            ]))
        );
    }

    #[test]
    fn invalid_uuid_in_condition_is_rejected() {
        let result: Result<Trigger, _> = serde_json::from_value(json!({
            "type": "task_assignment",
            "condition": { "assignee_id": "not-a-uuid" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_action_type_loads_as_unsupported() {
        let action: Action = serde_json::from_value(json!({
            "type": "launch_rocket",
            "params": { "target": "moon" }
        }))
        .unwrap();

        assert_eq!(action.kind(), "launch_rocket");
        assert!(!action.is_supported());
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({ "type": "launch_rocket", "params": { "target": "moon" } })
        );
    }

    #[test]
    fn change_status_requires_a_status() {
        let missing: Result<Action, _> = serde_json::from_value(json!({ "type": "change_status" }));
        assert!(missing.is_err());

        let blank: Result<Action, _> =
            serde_json::from_value(json!({ "type": "change_status", "params": { "status": " " } }));
        assert!(blank.is_err());
    }

    #[test]
    fn notification_message_is_optional() {
        let action: Action = serde_json::from_value(json!({ "type": "send_notification" })).unwrap();
        assert_eq!(action, Action::SendNotification { message: None });
    }

    #[test]
    fn single_action_and_list_are_merged() {
        let request: AutomationCreateRequest = serde_json::from_value(json!({
            "name": "Triage",
            "trigger": { "type": "task_creation" },
            "action": { "type": "apply_label", "params": { "label": "triage" } },
            "actions": [ { "type": "change_priority", "params": { "priority": "high" } } ]
        }))
        .unwrap();

        let draft = request.into_draft().unwrap();
        assert_eq!(draft.actions.len(), 2);
        assert!(draft.active);
    }

    #[test]
    fn rule_without_actions_is_rejected() {
        let request: AutomationCreateRequest = serde_json::from_value(json!({
            "name": "Nothing",
            "trigger": { "type": "task_creation" }
        }))
        .unwrap();

        assert!(request.into_draft().is_err());
    }
}
