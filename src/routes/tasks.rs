use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, Resource};
use crate::db::{projects, tasks};
use crate::errors::{AppError, AppResult};
use crate::events::publish_entity;
use crate::jwt::AuthUser;
use crate::models::notification::{NewNotification, NotificationCategory};
use crate::models::project::Project;
use crate::models::task::{normalize_tags, Task, TaskCreateRequest, TaskUpdateRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{id}/tasks",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Tasks of the project", body = [Task]),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Task>>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::VIEW)
        .await?;

    Ok(Json(tasks::list_for_project(&state.pool, project_id).await?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<Json<Task>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::VIEW)
        .await?;

    Ok(Json(tasks::fetch_task(&state.pool, project_id, task_id).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/tasks",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created; creation automations already applied", body = Task),
        (status = 400, description = "Unknown status or assignee"),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::CREATE)
        .await?;
    if payload.assignee.is_some() {
        state
            .gate
            .require(auth.user_id, project_id, Resource::Task, actions::ASSIGN)
            .await?;
    }

    let project = projects::fetch_project(&state.pool, project_id).await?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let status = match payload.status {
        Some(status) => {
            ensure_known_status(&project, &status)?;
            status
        }
        None => project
            .statuses
            .first()
            .cloned()
            .ok_or_else(|| AppError::internal("project has no statuses"))?,
    };

    if let Some(assignee) = payload.assignee {
        ensure_participant(&state, &project, assignee).await?;
    }

    let now = utc_now();
    let task = Task {
        id: Uuid::new_v4(),
        project_id,
        title: title.to_string(),
        description: payload.description,
        status,
        priority: payload.priority.unwrap_or_default(),
        due_date: payload.due_date,
        assignee: payload.assignee,
        tags: normalize_tags(payload.tags),
        created_by: auth.user_id,
        created_at: now,
        updated_at: now,
    };

    tasks::insert_task(&state.pool, &task).await?;
    tracing::info!(task_id = %task.id, project_id = %project_id, "task created");

    if let Some(assignee) = task.assignee {
        notify_assignee(&state, &task, assignee, auth.user_id).await;
    }

    state.engine.on_creation(&task).await;

    let task = tasks::fetch_task(&state.pool, project_id, task.id).await?;
    publish_entity(&state.event_bus, "created", Some(auth.user_id), &task);

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated; automations already applied", body = Task),
        (status = 400, description = "Unknown status or assignee"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "Task not found")
    )
)]
pub async fn update_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::VIEW)
        .await?;

    let project = projects::fetch_project(&state.pool, project_id).await?;
    let before = tasks::fetch_task(&state.pool, project_id, task_id).await?;

    let status_changed = payload.status.as_ref().is_some_and(|s| *s != before.status);
    let assignee_changed = payload.assignee.is_some_and(|a| a != before.assignee);
    let edits_fields = payload.title.is_some()
        || payload.description.is_some()
        || payload.priority.is_some()
        || payload.due_date.is_some()
        || payload.tags.is_some();

    if status_changed {
        state
            .gate
            .require(auth.user_id, project_id, Resource::Task, actions::MOVE)
            .await?;
    }
    if assignee_changed {
        state
            .gate
            .require(auth.user_id, project_id, Resource::Task, actions::ASSIGN)
            .await?;
    }
    if edits_fields || !(status_changed || assignee_changed) {
        state
            .gate
            .require(auth.user_id, project_id, Resource::Task, actions::EDIT)
            .await?;
    }

    let mut task = before.clone();

    if let Some(title) = payload.title {
        if title.trim().is_empty() {
            return Err(AppError::bad_request("title must not be empty"));
        }
        task.title = title.trim().to_string();
    }
    if let Some(description) = payload.description {
        task.description = Some(description);
    }
    if let Some(status) = payload.status {
        ensure_known_status(&project, &status)?;
        task.status = status;
    }
    if let Some(priority) = payload.priority {
        task.priority = priority;
    }
    if let Some(due_date) = payload.due_date {
        task.due_date = due_date;
    }
    if let Some(assignee) = payload.assignee {
        if let Some(user_id) = assignee {
            ensure_participant(&state, &project, user_id).await?;
        }
        task.assignee = assignee;
    }
    if let Some(tags) = payload.tags {
        task.tags = normalize_tags(tags);
    }

    if task == before {
        return Ok(Json(task));
    }

    task.updated_at = utc_now();
    tasks::update_task(&state.pool, &task).await?;

    // Events come from the caller's edit alone. Fields rewritten by rules
    // while an event is handled never raise another event.
    let edited = task.clone();
    let priority_changed = edited.priority != before.priority;

    if status_changed {
        state.engine.on_status_change(&edited, &before.status).await;
        task = tasks::fetch_task(&state.pool, project_id, task_id).await?;
    }
    if assignee_changed {
        if let Some(assignee) = edited.assignee {
            notify_assignee(&state, &edited, assignee, auth.user_id).await;
        }
        let subject = Task {
            assignee: edited.assignee,
            ..task.clone()
        };
        state.engine.on_assignment(&subject).await;
        task = tasks::fetch_task(&state.pool, project_id, task_id).await?;
    }
    if priority_changed {
        let subject = Task {
            priority: edited.priority,
            ..task.clone()
        };
        state.engine.on_priority_change(&subject, before.priority).await;
        task = tasks::fetch_task(&state.pool, project_id, task_id).await?;
    }

    publish_entity(&state.event_bus, "updated", Some(auth.user_id), &task);

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "Task not found")
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Task, actions::DELETE)
        .await?;

    let task = tasks::fetch_task(&state.pool, project_id, task_id).await?;
    tasks::soft_delete_task(&state.pool, project_id, task_id, utc_now()).await?;
    publish_entity(&state.event_bus, "deleted", Some(auth.user_id), &task);

    Ok(StatusCode::NO_CONTENT)
}

fn ensure_known_status(project: &Project, status: &str) -> AppResult<()> {
    if !project.has_status(status) {
        return Err(AppError::bad_request(format!(
            "status '{status}' is not one of the project's statuses"
        )));
    }
    Ok(())
}

async fn ensure_participant(state: &AppState, project: &Project, user_id: Uuid) -> AppResult<()> {
    if !projects::is_participant(&state.pool, project, user_id).await? {
        return Err(AppError::bad_request("assignee must be a member of the project"));
    }
    Ok(())
}

/// Tells a newly assigned user about the task unless they assigned themselves.
async fn notify_assignee(state: &AppState, task: &Task, assignee: Uuid, actor_id: Uuid) {
    if assignee == actor_id {
        return;
    }

    let notification = NewNotification {
        recipient_id: assignee,
        message: format!("You were assigned to \"{}\"", task.title),
        category: NotificationCategory::Assignment,
        project_id: Some(task.project_id),
        task_id: Some(task.id),
    };

    if let Err(err) = state.notifier.enqueue(notification).await {
        tracing::warn!(task_id = %task.id, error = %err, "failed to send assignment notification");
    }
}
