use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::users;
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::models::user::Badge;

#[utoipa::path(
    get,
    path = "/users/{id}/badges",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Badges held by the user", body = [Badge]),
        (status = 404, description = "User not found")
    )
)]
pub async fn list_badges(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    _auth: AuthUser,
) -> AppResult<Json<Vec<Badge>>> {
    users::fetch_user(&state.pool, user_id).await?;
    Ok(Json(users::list_badges(&state.pool, user_id).await?))
}
