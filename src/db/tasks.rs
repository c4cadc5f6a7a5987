use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::encode_json;
use crate::errors::{AppError, AppResult};
use crate::models::task::{DbTask, Priority, Task};

const TASK_COLUMNS: &str = "t.id, t.project_id, t.title, t.description, t.status, t.priority, t.due_date, t.assignee, t.tags, t.created_by, t.created_at, t.updated_at, t.deleted_at";

pub async fn insert_task(pool: &SqlitePool, task: &Task) -> AppResult<()> {
	sqlx::query(
		"INSERT INTO tasks (id, project_id, title, description, status, priority, due_date, assignee, tags, created_by, created_at, updated_at) \
		 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(task.id)
	.bind(task.project_id)
	.bind(&task.title)
	.bind(&task.description)
	.bind(&task.status)
	.bind(task.priority.as_str())
	.bind(task.due_date)
	.bind(task.assignee)
	.bind(encode_json(&task.tags)?)
	.bind(task.created_by)
	.bind(task.created_at)
	.bind(task.updated_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn find_task(pool: &SqlitePool, task_id: Uuid) -> AppResult<Option<Task>> {
	let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ? AND t.deleted_at IS NULL");
	sqlx::query_as::<_, DbTask>(&sql)
		.bind(task_id)
		.fetch_optional(pool)
		.await?
		.map(Task::try_from)
		.transpose()
}

/// Loads a live task that belongs to `project_id`.
pub async fn fetch_task(pool: &SqlitePool, project_id: Uuid, task_id: Uuid) -> AppResult<Task> {
	match find_task(pool, task_id).await? {
		Some(task) if task.project_id == project_id => Ok(task),
		_ => Err(AppError::not_found("task not found")),
	}
}

pub async fn list_for_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<Vec<Task>> {
	let sql = format!(
		"SELECT {TASK_COLUMNS} FROM tasks t WHERE t.project_id = ? AND t.deleted_at IS NULL ORDER BY t.created_at ASC, t.id ASC"
	);

	sqlx::query_as::<_, DbTask>(&sql)
		.bind(project_id)
		.fetch_all(pool)
		.await?
		.into_iter()
		.map(Task::try_from)
		.collect()
}

/// Writes every mutable field of `task`.
pub async fn update_task(pool: &SqlitePool, task: &Task) -> AppResult<()> {
	let affected = sqlx::query(
		"UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?, due_date = ?, assignee = ?, tags = ?, updated_at = ? \
		 WHERE id = ? AND deleted_at IS NULL",
	)
	.bind(&task.title)
	.bind(&task.description)
	.bind(&task.status)
	.bind(task.priority.as_str())
	.bind(task.due_date)
	.bind(task.assignee)
	.bind(encode_json(&task.tags)?)
	.bind(task.updated_at)
	.bind(task.id)
	.execute(pool)
	.await?;

	if affected.rows_affected() == 0 {
		return Err(AppError::not_found("task not found"));
	}

	Ok(())
}

pub async fn set_status(pool: &SqlitePool, task_id: Uuid, status: &str, now: DateTime<Utc>) -> AppResult<()> {
	let affected = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
		.bind(status)
		.bind(now)
		.bind(task_id)
		.execute(pool)
		.await?;

	ensure_touched(affected.rows_affected())
}

pub async fn set_assignee(pool: &SqlitePool, task_id: Uuid, assignee: Option<Uuid>, now: DateTime<Utc>) -> AppResult<()> {
	let affected = sqlx::query("UPDATE tasks SET assignee = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
		.bind(assignee)
		.bind(now)
		.bind(task_id)
		.execute(pool)
		.await?;

	ensure_touched(affected.rows_affected())
}

pub async fn set_priority(pool: &SqlitePool, task_id: Uuid, priority: Priority, now: DateTime<Utc>) -> AppResult<()> {
	let affected = sqlx::query("UPDATE tasks SET priority = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
		.bind(priority.as_str())
		.bind(now)
		.bind(task_id)
		.execute(pool)
		.await?;

	ensure_touched(affected.rows_affected())
}

pub async fn set_tags(pool: &SqlitePool, task_id: Uuid, tags: &[String], now: DateTime<Utc>) -> AppResult<()> {
	let affected = sqlx::query("UPDATE tasks SET tags = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
		.bind(encode_json(&tags)?)
		.bind(now)
		.bind(task_id)
		.execute(pool)
		.await?;

	ensure_touched(affected.rows_affected())
}

pub async fn soft_delete_task(pool: &SqlitePool, project_id: Uuid, task_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
	let affected = sqlx::query(
		"UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ? AND project_id = ? AND deleted_at IS NULL",
	)
	.bind(now)
	.bind(now)
	.bind(task_id)
	.bind(project_id)
	.execute(pool)
	.await?;

	ensure_touched(affected.rows_affected())
}

/// Live tasks in live projects whose due date is strictly before `cutoff`
/// and whose status is not `done_status`, oldest due date first.
pub async fn find_overdue(pool: &SqlitePool, cutoff: DateTime<Utc>, done_status: &str) -> AppResult<Vec<Task>> {
	let sql = format!(
		"SELECT {TASK_COLUMNS} FROM tasks t \
		 INNER JOIN projects p ON p.id = t.project_id \
		 WHERE t.deleted_at IS NULL AND p.deleted_at IS NULL \
		   AND t.due_date IS NOT NULL AND t.status != ?"
	);

	let rows = sqlx::query_as::<_, DbTask>(&sql)
		.bind(done_status)
		.fetch_all(pool)
		.await?;

	// Timestamps are stored as text, so the date comparison happens on parsed values.
	let mut overdue = rows
		.into_iter()
		.map(Task::try_from)
		.collect::<AppResult<Vec<Task>>>()?
		.into_iter()
		.filter(|task| task.due_date.is_some_and(|due| due < cutoff))
		.collect::<Vec<_>>();

	overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
	Ok(overdue)
}

fn ensure_touched(rows: u64) -> AppResult<()> {
	if rows == 0 {
		return Err(AppError::not_found("task not found"));
	}
	Ok(())
}
