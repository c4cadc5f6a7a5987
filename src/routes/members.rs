use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, Resource};
use crate::db::{projects, users};
use crate::errors::{AppError, AppResult};
use crate::events::{project_topic, publish, DomainEvent};
use crate::jwt::AuthUser;
use crate::models::project::{MemberAddRequest, MemberUpdateRequest, ProjectMember};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Project members", body = [ProjectMember]))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Vec<ProjectMember>>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::VIEW)
        .await?;

    Ok(Json(projects::list_members(&state.pool, project_id).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = MemberAddRequest,
    responses(
        (status = 201, description = "Member added", body = ProjectMember),
        (status = 403, description = "Insufficient permissions"),
        (status = 409, description = "Already a member")
    )
)]
pub async fn add_member(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<MemberAddRequest>,
) -> AppResult<(StatusCode, Json<ProjectMember>)> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::INVITE)
        .await?;

    let project = projects::fetch_project(&state.pool, project_id).await?;
    if project.owner_id == payload.user_id {
        return Err(AppError::conflict("the owner is already an admin of this project"));
    }
    users::fetch_user(&state.pool, payload.user_id).await?;

    let member = projects::insert_member(&state.pool, project_id, payload.user_id, payload.role, utc_now()).await?;
    publish_member_event(&state, "member.added", auth.user_id, &member);

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/members/{user_id}",
    tag = "Members",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    request_body = MemberUpdateRequest,
    responses(
        (status = 200, description = "Role changed", body = ProjectMember),
        (status = 404, description = "Member not found")
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
    Json(payload): Json<MemberUpdateRequest>,
) -> AppResult<Json<ProjectMember>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::INVITE)
        .await?;

    projects::update_member_role(&state.pool, project_id, user_id, payload.role).await?;
    let member = projects::find_member(&state.pool, project_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))?;

    publish_member_event(&state, "member.updated", auth.user_id, &member);

    Ok(Json(member))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/members/{user_id}",
    tag = "Members",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn remove_member(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::INVITE)
        .await?;

    let member = projects::find_member(&state.pool, project_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))?;
    projects::remove_member(&state.pool, project_id, user_id).await?;

    publish_member_event(&state, "member.removed", auth.user_id, &member);

    Ok(StatusCode::NO_CONTENT)
}

fn publish_member_event(state: &AppState, name: &str, actor_id: Uuid, member: &ProjectMember) {
    publish(
        &state.event_bus,
        DomainEvent::new(
            project_topic(member.project_id),
            name,
            Some(actor_id),
            Some(member.user_id),
            json!({ "user_id": member.user_id, "role": member.role }),
        ),
    );
}
