use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, Resource};
use crate::db::{comments, tasks};
use crate::errors::{AppError, AppResult};
use crate::events::{project_topic, publish, publish_entity, DomainEvent};
use crate::jwt::AuthUser;
use crate::models::comment::{Comment, CommentCreateRequest};
use crate::models::notification::{NewNotification, NotificationCategory};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{id}/tasks/{task_id}/comments",
    tag = "Comments",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses((status = 200, description = "Comments, oldest first", body = [Comment]))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Comment>>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::VIEW)
        .await?;

    let task = tasks::fetch_task(&state.pool, project_id, task_id).await?;
    Ok(Json(comments::list_for_task(&state.pool, task.id).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/tasks/{task_id}/comments",
    tag = "Comments",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = CommentCreateRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn add_comment(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
    Json(payload): Json<CommentCreateRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::COMMENT)
        .await?;

    let body = payload.body.trim();
    if body.is_empty() {
        return Err(AppError::bad_request("comment must not be empty"));
    }

    let task = tasks::fetch_task(&state.pool, project_id, task_id).await?;
    let comment = comments::insert_comment(&state.pool, task.id, Some(auth.user_id), body, utc_now()).await?;

    if let Some(assignee) = task.assignee.filter(|assignee| *assignee != auth.user_id) {
        let notification = NewNotification {
            recipient_id: assignee,
            message: format!("New comment on \"{}\"", task.title),
            category: NotificationCategory::Comment,
            project_id: Some(project_id),
            task_id: Some(task.id),
        };
        if let Err(err) = state.notifier.enqueue(notification).await {
            tracing::warn!(task_id = %task.id, error = %err, "failed to send comment notification");
        }
    }

    let outcomes = state.engine.on_comment(&task, &comment).await;
    if outcomes.iter().any(|outcome| outcome.is_applied()) {
        let refreshed = tasks::fetch_task(&state.pool, project_id, task.id).await?;
        publish_entity(&state.event_bus, "updated", Some(auth.user_id), &refreshed);
    }

    publish(
        &state.event_bus,
        DomainEvent::new(
            project_topic(project_id),
            "comment.created",
            Some(auth.user_id),
            Some(comment.id),
            serde_json::to_value(&comment)?,
        ),
    );

    Ok((StatusCode::CREATED, Json(comment)))
}
