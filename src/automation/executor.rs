use std::sync::Arc;

use sqlx::SqlitePool;

use crate::automation::rule::{Action, DEFAULT_NOTIFICATION_MESSAGE};
use crate::db::{comments, projects, tasks, users};
use crate::errors::AppResult;
use crate::models::notification::{NewNotification, NotificationCategory};
use crate::models::task::{Priority, Task};
use crate::notifications::NotificationSink;
use crate::utils::utc_now;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEffect {
    Applied,
    Skipped(String),
}

/// Applies single actions to a task, writing through to storage and keeping
/// the in-memory `Task` in sync so later actions see earlier effects.
#[derive(Clone)]
pub struct ActionExecutor {
    pool: SqlitePool,
    notifier: Arc<dyn NotificationSink>,
}

impl ActionExecutor {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { pool, notifier }
    }

    pub async fn execute(&self, action: &Action, task: &mut Task) -> AppResult<ActionEffect> {
        match action {
            Action::ChangeStatus { status } => self.change_status(task, status).await,
            Action::AssignBadge { badge_name } => self.assign_badge(task, badge_name).await,
            Action::SendNotification { message } => self.send_notification(task, message.as_deref()).await,
            Action::ReassignTask { assignee_id } => {
                if task.assignee == *assignee_id {
                    return Ok(ActionEffect::Skipped("task already has that assignee".to_string()));
                }
                let now = utc_now();
                tasks::set_assignee(&self.pool, task.id, *assignee_id, now).await?;
                task.assignee = *assignee_id;
                task.updated_at = now;
                Ok(ActionEffect::Applied)
            }
            Action::AddComment { text } => {
                comments::insert_comment(&self.pool, task.id, None, text, utc_now()).await?;
                Ok(ActionEffect::Applied)
            }
            Action::ChangePriority { priority } => self.change_priority(task, *priority).await,
            Action::ApplyLabel { label } => {
                if task.has_tag(label) {
                    return Ok(ActionEffect::Skipped(format!("label '{label}' already present")));
                }
                let mut tags = task.tags.clone();
                tags.push(label.clone());
                self.write_tags(task, tags).await
            }
            Action::RemoveLabel { label } => {
                if !task.has_tag(label) {
                    return Ok(ActionEffect::Skipped(format!("label '{label}' not present")));
                }
                let tags = task.tags.iter().filter(|tag| *tag != label).cloned().collect();
                self.write_tags(task, tags).await
            }
            Action::Unsupported { kind, .. } => {
                tracing::warn!(action = %kind, task_id = %task.id, "unsupported automation action ignored");
                Ok(ActionEffect::Skipped(format!("unsupported action type '{kind}'")))
            }
        }
    }

    /// Overwrites the status unconditionally. A status missing from the
    /// project's list is still written, with a warning.
    async fn change_status(&self, task: &mut Task, status: &str) -> AppResult<ActionEffect> {
        let now = utc_now();
        tasks::set_status(&self.pool, task.id, status, now).await?;

        match projects::find_project(&self.pool, task.project_id).await {
            Ok(Some(project)) if !project.has_status(status) => {
                tracing::warn!(
                    task_id = %task.id,
                    project_id = %task.project_id,
                    status,
                    "automation set a status the project does not define"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(error = %err, "could not check status against project"),
        }

        task.status = status.to_string();
        task.updated_at = now;
        Ok(ActionEffect::Applied)
    }

    async fn assign_badge(&self, task: &Task, badge_name: &str) -> AppResult<ActionEffect> {
        let Some(assignee) = task.assignee else {
            return Ok(ActionEffect::Skipped("task has no assignee".to_string()));
        };

        users::fetch_user(&self.pool, assignee).await?;

        let awarded = users::award_badge(&self.pool, assignee, badge_name, task.project_id, utc_now()).await?;
        if !awarded {
            return Ok(ActionEffect::Skipped(format!("badge '{badge_name}' already held")));
        }

        self.notifier
            .enqueue(NewNotification {
                recipient_id: assignee,
                message: format!("You earned the \"{badge_name}\" badge!"),
                category: NotificationCategory::Badge,
                project_id: Some(task.project_id),
                task_id: Some(task.id),
            })
            .await?;

        Ok(ActionEffect::Applied)
    }

    async fn send_notification(&self, task: &Task, message: Option<&str>) -> AppResult<ActionEffect> {
        let Some(assignee) = task.assignee else {
            return Ok(ActionEffect::Skipped("task has no assignee".to_string()));
        };

        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_NOTIFICATION_MESSAGE)
            .to_string();

        self.notifier
            .enqueue(NewNotification {
                recipient_id: assignee,
                message,
                category: NotificationCategory::Automation,
                project_id: Some(task.project_id),
                task_id: Some(task.id),
            })
            .await?;

        Ok(ActionEffect::Applied)
    }

    async fn change_priority(&self, task: &mut Task, priority: Priority) -> AppResult<ActionEffect> {
        let now = utc_now();
        tasks::set_priority(&self.pool, task.id, priority, now).await?;
        task.priority = priority;
        task.updated_at = now;
        Ok(ActionEffect::Applied)
    }

    async fn write_tags(&self, task: &mut Task, tags: Vec<String>) -> AppResult<ActionEffect> {
        let now = utc_now();
        tasks::set_tags(&self.pool, task.id, &tags, now).await?;
        task.tags = tags;
        task.updated_at = now;
        Ok(ActionEffect::Applied)
    }
}
