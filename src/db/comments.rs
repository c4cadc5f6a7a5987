use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::comment::Comment;

pub async fn insert_comment(
	pool: &SqlitePool,
	task_id: Uuid,
	author_id: Option<Uuid>,
	body: &str,
	now: DateTime<Utc>,
) -> AppResult<Comment> {
	let comment = Comment {
		id: Uuid::new_v4(),
		task_id,
		author_id,
		body: body.to_string(),
		created_at: now,
	};

	sqlx::query("INSERT INTO task_comments (id, task_id, author_id, body, created_at) VALUES (?, ?, ?, ?, ?)")
		.bind(comment.id)
		.bind(comment.task_id)
		.bind(comment.author_id)
		.bind(&comment.body)
		.bind(comment.created_at)
		.execute(pool)
		.await?;

	Ok(comment)
}

pub async fn list_for_task(pool: &SqlitePool, task_id: Uuid) -> AppResult<Vec<Comment>> {
	let comments = sqlx::query_as::<_, Comment>(
		"SELECT id, task_id, author_id, body, created_at FROM task_comments WHERE task_id = ? ORDER BY created_at ASC, id ASC",
	)
	.bind(task_id)
	.fetch_all(pool)
	.await?;

	Ok(comments)
}
