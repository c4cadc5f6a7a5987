use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, Resource};
use crate::db::projects;
use crate::errors::{AppError, AppResult};
use crate::events::publish_entity;
use crate::jwt::AuthUser;
use crate::models::project::{
    validate_statuses, Project, ProjectCreateRequest, ProjectUpdateRequest, DEFAULT_STATUSES,
};
use crate::utils::utc_now;

const DEFAULT_THEME: &str = "#3498db";

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "Projects the caller owns or belongs to", body = [Project]))
)]
pub async fn list_projects(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Project>>> {
    let projects = projects::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid project data")
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let statuses = match payload.statuses {
        Some(statuses) => {
            validate_statuses(&statuses)?;
            statuses
        }
        None => DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect(),
    };

    let now = utc_now();
    let project = Project {
        id: Uuid::new_v4(),
        owner_id: auth.user_id,
        name: name.to_string(),
        description: payload.description,
        theme_color: payload.theme_color.unwrap_or_else(|| DEFAULT_THEME.to_string()),
        statuses,
        created_at: now,
        updated_at: now,
    };

    projects::insert_project(&state.pool, &project).await?;
    publish_entity(&state.event_bus, "created", Some(auth.user_id), &project);

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project", body = Project),
        (status = 403, description = "Not a project member"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Project>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::VIEW)
        .await?;

    let project = projects::fetch_project(&state.pool, project_id).await?;
    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::EDIT)
        .await?;

    let mut project = projects::fetch_project(&state.pool, project_id).await?;

    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        project.name = name.trim().to_string();
    }
    if let Some(description) = payload.description {
        project.description = Some(description);
    }
    if let Some(theme_color) = payload.theme_color {
        project.theme_color = theme_color;
    }
    if let Some(statuses) = payload.statuses {
        validate_statuses(&statuses)?;
        project.statuses = statuses;
    }
    project.updated_at = utc_now();

    projects::update_project(&state.pool, &project).await?;
    publish_entity(&state.event_bus, "updated", Some(auth.user_id), &project);

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::DELETE)
        .await?;

    let project = projects::fetch_project(&state.pool, project_id).await?;
    projects::soft_delete_project(&state.pool, project_id, utc_now()).await?;

    let removed = state.engine.store().delete_for_project(project_id).await?;
    tracing::info!(project_id = %project_id, automations_removed = removed, "project deleted");

    publish_entity(&state.event_bus, "deleted", Some(auth.user_id), &project);

    Ok(StatusCode::NO_CONTENT)
}
