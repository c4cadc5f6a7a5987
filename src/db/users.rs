use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::user::{Badge, DbUser};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at, deleted_at";

pub async fn insert_user(
	pool: &SqlitePool,
	id: Uuid,
	name: &str,
	email: &str,
	password_hash: &str,
	now: DateTime<Utc>,
) -> AppResult<()> {
	sqlx::query(
		"INSERT INTO users (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
	)
	.bind(id)
	.bind(name)
	.bind(email)
	.bind(password_hash)
	.bind(now)
	.bind(now)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn fetch_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
	find_user(pool, user_id)
		.await?
		.ok_or_else(|| AppError::not_found("user not found"))
}

pub async fn find_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<DbUser>> {
	let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
	let user = sqlx::query_as::<_, DbUser>(&sql)
		.bind(user_id)
		.fetch_optional(pool)
		.await?;

	Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
	let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL");
	let user = sqlx::query_as::<_, DbUser>(&sql)
		.bind(email)
		.fetch_optional(pool)
		.await?;

	Ok(user)
}

/// Awards `name` to the user unless they already hold a badge with that name.
/// Returns `true` only when a new badge row was written.
pub async fn award_badge(
	pool: &SqlitePool,
	user_id: Uuid,
	name: &str,
	project_id: Uuid,
	awarded_at: DateTime<Utc>,
) -> AppResult<bool> {
	let result = sqlx::query(
		"INSERT INTO user_badges (user_id, name, project_id, awarded_at) VALUES (?, ?, ?, ?) ON CONFLICT (user_id, name) DO NOTHING",
	)
	.bind(user_id)
	.bind(name)
	.bind(project_id)
	.bind(awarded_at)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn list_badges(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Badge>> {
	let badges = sqlx::query_as::<_, Badge>(
		"SELECT name, project_id, awarded_at FROM user_badges WHERE user_id = ? ORDER BY awarded_at ASC, name ASC",
	)
	.bind(user_id)
	.fetch_all(pool)
	.await?;

	Ok(badges)
}
