use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::models::notification::Notification;
use crate::notifications;
use crate::routes::MessageResponse;

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    responses((status = 200, description = "Caller's notifications, newest first", body = [Notification]))
)]
pub async fn list_notifications(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(notifications::list_for_recipient(&state.pool, auth.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked as read", body = MessageResponse),
        (status = 404, description = "Not found or not the caller's")
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<MessageResponse>> {
    notifications::mark_read(&state.pool, auth.user_id, notification_id).await?;
    Ok(Json(MessageResponse::new("Notification marked as read")))
}
