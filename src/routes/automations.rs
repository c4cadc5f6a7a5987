use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, Resource};
use crate::automation::{AutomationCreateRequest, AutomationRule, AutomationUpdateRequest};
use crate::db::projects;
use crate::errors::AppResult;
use crate::events::{project_topic, publish, DomainEvent};
use crate::jwt::AuthUser;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{id}/automations",
    tag = "Automations",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Rules in creation order", body = [AutomationRule]))
)]
pub async fn list_automations(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Vec<AutomationRule>>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Automation, actions::VIEW)
        .await?;

    Ok(Json(state.engine.store().list(project_id).await?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/automations/{rule_id}",
    tag = "Automations",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("rule_id" = Uuid, Path, description = "Automation id")
    ),
    responses(
        (status = 200, description = "Rule", body = AutomationRule),
        (status = 404, description = "Rule not found")
    )
)]
pub async fn get_automation(
    State(state): State<AppState>,
    Path((project_id, rule_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<Json<AutomationRule>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Automation, actions::VIEW)
        .await?;

    Ok(Json(state.engine.store().get(project_id, rule_id).await?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/automations",
    tag = "Automations",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AutomationCreateRequest,
    responses(
        (status = 201, description = "Rule created", body = AutomationRule),
        (status = 400, description = "Invalid rule definition"),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn create_automation(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<AutomationCreateRequest>,
) -> AppResult<(StatusCode, Json<AutomationRule>)> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Automation, actions::CREATE)
        .await?;

    let project = projects::fetch_project(&state.pool, project_id).await?;
    let rule = state
        .engine
        .store()
        .create(&project, auth.user_id, payload.into_draft()?)
        .await?;

    publish_rule_event(&state, "automation.created", auth.user_id, &rule);

    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/automations/{rule_id}",
    tag = "Automations",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("rule_id" = Uuid, Path, description = "Automation id")
    ),
    request_body = AutomationUpdateRequest,
    responses(
        (status = 200, description = "Rule updated", body = AutomationRule),
        (status = 400, description = "Invalid rule definition"),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn update_automation(
    State(state): State<AppState>,
    Path((project_id, rule_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
    Json(payload): Json<AutomationUpdateRequest>,
) -> AppResult<Json<AutomationRule>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Automation, actions::EDIT)
        .await?;

    // Toggling through a plain update needs the matching enable/disable right too.
    if let Some(active) = payload.active {
        let action = if active { actions::ENABLE } else { actions::DISABLE };
        state
            .gate
            .require(auth.user_id, project_id, Resource::Automation, action)
            .await?;
    }

    let project = projects::fetch_project(&state.pool, project_id).await?;
    let store = state.engine.store();
    let current = store.get(project_id, rule_id).await?;
    let rule = store.update(&project, rule_id, payload.apply_to(&current)).await?;

    publish_rule_event(&state, "automation.updated", auth.user_id, &rule);

    Ok(Json(rule))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/automations/{rule_id}/enable",
    tag = "Automations",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("rule_id" = Uuid, Path, description = "Automation id")
    ),
    responses((status = 200, description = "Rule enabled", body = AutomationRule))
)]
pub async fn enable_automation(
    State(state): State<AppState>,
    Path((project_id, rule_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<Json<AutomationRule>> {
    toggle(&state, project_id, rule_id, auth.user_id, true).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/projects/{id}/automations/{rule_id}/disable",
    tag = "Automations",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("rule_id" = Uuid, Path, description = "Automation id")
    ),
    responses((status = 200, description = "Rule disabled", body = AutomationRule))
)]
pub async fn disable_automation(
    State(state): State<AppState>,
    Path((project_id, rule_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<Json<AutomationRule>> {
    toggle(&state, project_id, rule_id, auth.user_id, false).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/automations/{rule_id}",
    tag = "Automations",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("rule_id" = Uuid, Path, description = "Automation id")
    ),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 403, description = "Insufficient permissions")
    )
)]
pub async fn delete_automation(
    State(state): State<AppState>,
    Path((project_id, rule_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Automation, actions::DELETE)
        .await?;

    let rule = state.engine.store().get(project_id, rule_id).await?;
    state.engine.store().delete(project_id, rule_id).await?;

    publish_rule_event(&state, "automation.deleted", auth.user_id, &rule);

    Ok(StatusCode::NO_CONTENT)
}

async fn toggle(state: &AppState, project_id: Uuid, rule_id: Uuid, user_id: Uuid, active: bool) -> AppResult<AutomationRule> {
    let action = if active { actions::ENABLE } else { actions::DISABLE };
    state
        .gate
        .require(user_id, project_id, Resource::Automation, action)
        .await?;

    let rule = state
        .engine
        .store()
        .set_active(project_id, rule_id, active, utc_now())
        .await?;

    publish_rule_event(state, "automation.updated", user_id, &rule);
    Ok(rule)
}

fn publish_rule_event(state: &AppState, name: &str, actor_id: Uuid, rule: &AutomationRule) {
    let payload = match serde_json::to_value(rule) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(rule_id = %rule.id, error = %err, "failed to serialize automation event");
            return;
        }
    };

    publish(
        &state.event_bus,
        DomainEvent::new(project_topic(rule.project_id), name, Some(actor_id), Some(rule.id), payload),
    );
}
