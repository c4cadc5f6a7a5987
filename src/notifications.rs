//! Notification sink used by automations and task workflows.
//!
//! Delivery is fire-and-forget from the caller's point of view: the default
//! sink stores the notification and pushes it to the recipient's realtime
//! topic.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::events::{publish, user_topic, DomainEvent, EventBus};
use crate::models::notification::{DbNotification, NewNotification, Notification};
use crate::utils::utc_now;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue(&self, notification: NewNotification) -> AppResult<()>;
}

#[derive(Clone)]
pub struct SqliteNotificationSink {
    pool: SqlitePool,
    bus: EventBus,
}

impl SqliteNotificationSink {
    pub fn new(pool: SqlitePool, bus: EventBus) -> Self {
        Self { pool, bus }
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn enqueue(&self, notification: NewNotification) -> AppResult<()> {
        let stored = Notification {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            message: notification.message,
            category: notification.category,
            project_id: notification.project_id,
            task_id: notification.task_id,
            read: false,
            created_at: utc_now(),
        };

        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, message, category, project_id, task_id, read, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(stored.id)
        .bind(stored.recipient_id)
        .bind(&stored.message)
        .bind(stored.category.as_str())
        .bind(stored.project_id)
        .bind(stored.task_id)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            recipient_id = %stored.recipient_id,
            category = stored.category.as_str(),
            "notification enqueued"
        );

        let payload = serde_json::to_value(&stored)?;
        publish(
            &self.bus,
            DomainEvent::new(
                user_topic(stored.recipient_id),
                "notification.created",
                None,
                Some(stored.id),
                payload,
            ),
        );

        Ok(())
    }
}

pub async fn list_for_recipient(pool: &SqlitePool, recipient_id: Uuid) -> AppResult<Vec<Notification>> {
    sqlx::query_as::<_, DbNotification>(
        "SELECT id, recipient_id, message, category, project_id, task_id, read, created_at FROM notifications WHERE recipient_id = ? ORDER BY created_at DESC",
    )
    .bind(recipient_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Notification::try_from)
    .collect()
}

pub async fn mark_read(pool: &SqlitePool, recipient_id: Uuid, notification_id: Uuid) -> AppResult<()> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND recipient_id = ?")
        .bind(notification_id)
        .bind(recipient_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("notification not found"));
    }

    Ok(())
}
