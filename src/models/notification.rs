use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Automation,
    Badge,
    Assignment,
    Comment,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Automation => "automation",
            NotificationCategory::Badge => "badge",
            NotificationCategory::Assignment => "assignment",
            NotificationCategory::Comment => "comment",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automation" => Ok(NotificationCategory::Automation),
            "badge" => Ok(NotificationCategory::Badge),
            "assignment" => Ok(NotificationCategory::Assignment),
            "comment" => Ok(NotificationCategory::Comment),
            other => Err(AppError::internal(format!("unknown notification category '{other}'"))),
        }
    }
}

/// What the core hands to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub message: String,
    pub category: NotificationCategory,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
    pub category: NotificationCategory,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbNotification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
    pub category: String,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbNotification> for Notification {
    type Error = AppError;

    fn try_from(value: DbNotification) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: value.id,
            recipient_id: value.recipient_id,
            message: value.message,
            category: value.category.parse()?,
            project_id: value.project_id,
            task_id: value.task_id,
            read: value.read,
            created_at: value.created_at,
        })
    }
}
