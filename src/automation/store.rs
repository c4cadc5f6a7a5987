use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::automation::rule::{Action, AutomationRule, DbAutomationRule, RuleDraft, TriggerType};
use crate::db::{encode_json, projects};
use crate::errors::{AppError, AppResult};
use crate::models::project::Project;
use crate::utils::utc_now;

const RULE_COLUMNS: &str =
    "id, project_id, name, trigger_type, trigger, actions, active, created_by, created_at, updated_at";

/// Persistence for automation rules.
///
/// Writes go through [`AutomationStore::validate`], so a stored rule always
/// references statuses and assignees that existed in its project at write time.
#[derive(Debug, Clone)]
pub struct AutomationStore {
    pool: SqlitePool,
}

impl AutomationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Active rules of one trigger type, oldest first.
    pub async fn list_active(&self, project_id: Uuid, trigger_type: TriggerType) -> AppResult<Vec<AutomationRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM automations WHERE project_id = ? AND trigger_type = ? AND active = 1 \
             ORDER BY created_at ASC, id ASC"
        );

        let rows = sqlx::query_as::<_, DbAutomationRule>(&sql)
            .bind(project_id)
            .bind(trigger_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        into_ordered(rows)
    }

    pub async fn list(&self, project_id: Uuid) -> AppResult<Vec<AutomationRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM automations WHERE project_id = ? ORDER BY created_at ASC, id ASC");

        let rows = sqlx::query_as::<_, DbAutomationRule>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

        into_ordered(rows)
    }

    pub async fn get(&self, project_id: Uuid, rule_id: Uuid) -> AppResult<AutomationRule> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM automations WHERE id = ? AND project_id = ?");

        sqlx::query_as::<_, DbAutomationRule>(&sql)
            .bind(rule_id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("automation not found"))
            .and_then(AutomationRule::try_from)
    }

    pub async fn create(&self, project: &Project, created_by: Uuid, draft: RuleDraft) -> AppResult<AutomationRule> {
        self.validate(project, &draft).await?;

        let now = utc_now();
        let rule = AutomationRule {
            id: Uuid::new_v4(),
            project_id: project.id,
            name: draft.name.trim().to_string(),
            trigger: draft.trigger,
            actions: draft.actions,
            active: draft.active,
            created_by,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO automations (id, project_id, name, trigger_type, trigger, actions, active, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id)
        .bind(rule.project_id)
        .bind(&rule.name)
        .bind(rule.trigger.trigger_type().as_str())
        .bind(encode_json(&rule.trigger)?)
        .bind(encode_json(&rule.actions)?)
        .bind(rule.active)
        .bind(rule.created_by)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            rule_id = %rule.id,
            project_id = %rule.project_id,
            trigger = %rule.trigger.trigger_type(),
            "automation created"
        );

        Ok(rule)
    }

    /// Replaces the definition of an existing rule.
    pub async fn update(&self, project: &Project, rule_id: Uuid, draft: RuleDraft) -> AppResult<AutomationRule> {
        let mut rule = self.get(project.id, rule_id).await?;
        self.validate(project, &draft).await?;

        rule.name = draft.name.trim().to_string();
        rule.trigger = draft.trigger;
        rule.actions = draft.actions;
        rule.active = draft.active;
        rule.updated_at = utc_now();

        sqlx::query(
            "UPDATE automations SET name = ?, trigger_type = ?, trigger = ?, actions = ?, active = ?, updated_at = ? \
             WHERE id = ? AND project_id = ?",
        )
        .bind(&rule.name)
        .bind(rule.trigger.trigger_type().as_str())
        .bind(encode_json(&rule.trigger)?)
        .bind(encode_json(&rule.actions)?)
        .bind(rule.active)
        .bind(rule.updated_at)
        .bind(rule.id)
        .bind(rule.project_id)
        .execute(&self.pool)
        .await?;

        Ok(rule)
    }

    pub async fn set_active(
        &self,
        project_id: Uuid,
        rule_id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> AppResult<AutomationRule> {
        let result = sqlx::query("UPDATE automations SET active = ?, updated_at = ? WHERE id = ? AND project_id = ?")
            .bind(active)
            .bind(now)
            .bind(rule_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("automation not found"));
        }

        tracing::info!(rule_id = %rule_id, active, "automation toggled");
        self.get(project_id, rule_id).await
    }

    pub async fn delete(&self, project_id: Uuid, rule_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM automations WHERE id = ? AND project_id = ?")
            .bind(rule_id)
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("automation not found"));
        }

        Ok(())
    }

    /// Removes every rule of a project; used when the project goes away.
    pub async fn delete_for_project(&self, project_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM automations WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn validate(&self, project: &Project, draft: &RuleDraft) -> AppResult<()> {
        if draft.name.trim().is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        if draft.actions.is_empty() {
            return Err(AppError::bad_request("a rule needs at least one action"));
        }

        for action in &draft.actions {
            match action {
                Action::ChangeStatus { status } if !project.has_status(status) => {
                    return Err(AppError::bad_request(format!(
                        "status '{status}' is not one of the project's statuses"
                    )));
                }
                Action::ReassignTask { assignee_id: Some(assignee) } => {
                    if !projects::is_participant(&self.pool, project, *assignee).await? {
                        return Err(AppError::bad_request("reassign target is not a project member"));
                    }
                }
                Action::Unsupported { kind, .. } => {
                    return Err(AppError::bad_request(format!("unsupported action type '{kind}'")));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Rows that no longer decode are skipped so one bad rule cannot silence its siblings.
fn into_ordered(rows: Vec<DbAutomationRule>) -> AppResult<Vec<AutomationRule>> {
    let mut rules = rows
        .into_iter()
        .filter_map(|row| {
            let rule_id = row.id;
            match AutomationRule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    tracing::warn!(rule_id = %rule_id, error = %err, "skipping undecodable automation");
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(rules)
}
