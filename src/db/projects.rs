use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::ProjectRole;
use crate::db::encode_json;
use crate::errors::{AppError, AppResult};
use crate::models::project::{DbProject, DbProjectMember, Project, ProjectMember};

const PROJECT_COLUMNS: &str =
	"p.id, p.owner_id, p.name, p.description, p.theme_color, p.statuses, p.created_at, p.updated_at, p.deleted_at";

pub async fn insert_project(pool: &SqlitePool, project: &Project) -> AppResult<()> {
	sqlx::query(
		"INSERT INTO projects (id, owner_id, name, description, theme_color, statuses, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(project.id)
	.bind(project.owner_id)
	.bind(&project.name)
	.bind(&project.description)
	.bind(&project.theme_color)
	.bind(encode_json(&project.statuses)?)
	.bind(project.created_at)
	.bind(project.updated_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn find_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<Option<Project>> {
	let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.id = ? AND p.deleted_at IS NULL");
	sqlx::query_as::<_, DbProject>(&sql)
		.bind(project_id)
		.fetch_optional(pool)
		.await?
		.map(Project::try_from)
		.transpose()
}

pub async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<Project> {
	find_project(pool, project_id)
		.await?
		.ok_or_else(|| AppError::not_found("project not found"))
}

/// Projects the user owns or is a member of, newest first.
pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Project>> {
	let sql = format!(
		"SELECT {PROJECT_COLUMNS} FROM projects p \
		 WHERE p.deleted_at IS NULL \
		   AND (p.owner_id = ? OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ?)) \
		 ORDER BY p.created_at DESC"
	);

	sqlx::query_as::<_, DbProject>(&sql)
		.bind(user_id)
		.bind(user_id)
		.fetch_all(pool)
		.await?
		.into_iter()
		.map(Project::try_from)
		.collect()
}

pub async fn update_project(pool: &SqlitePool, project: &Project) -> AppResult<()> {
	sqlx::query(
		"UPDATE projects SET name = ?, description = ?, theme_color = ?, statuses = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
	)
	.bind(&project.name)
	.bind(&project.description)
	.bind(&project.theme_color)
	.bind(encode_json(&project.statuses)?)
	.bind(project.updated_at)
	.bind(project.id)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn soft_delete_project(pool: &SqlitePool, project_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
	let affected = sqlx::query("UPDATE projects SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
		.bind(now)
		.bind(now)
		.bind(project_id)
		.execute(pool)
		.await?;

	if affected.rows_affected() == 0 {
		return Err(AppError::not_found("project not found"));
	}

	Ok(())
}

pub async fn list_members(pool: &SqlitePool, project_id: Uuid) -> AppResult<Vec<ProjectMember>> {
	sqlx::query_as::<_, DbProjectMember>(
		"SELECT project_id, user_id, role, created_at FROM project_members WHERE project_id = ? ORDER BY created_at ASC",
	)
	.bind(project_id)
	.fetch_all(pool)
	.await?
	.into_iter()
	.map(ProjectMember::try_from)
	.collect()
}

pub async fn find_member(pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> AppResult<Option<ProjectMember>> {
	sqlx::query_as::<_, DbProjectMember>(
		"SELECT project_id, user_id, role, created_at FROM project_members WHERE project_id = ? AND user_id = ?",
	)
	.bind(project_id)
	.bind(user_id)
	.fetch_optional(pool)
	.await?
	.map(ProjectMember::try_from)
	.transpose()
}

pub async fn insert_member(
	pool: &SqlitePool,
	project_id: Uuid,
	user_id: Uuid,
	role: ProjectRole,
	now: DateTime<Utc>,
) -> AppResult<ProjectMember> {
	let result = sqlx::query(
		"INSERT INTO project_members (project_id, user_id, role, created_at) VALUES (?, ?, ?, ?) ON CONFLICT (project_id, user_id) DO NOTHING",
	)
	.bind(project_id)
	.bind(user_id)
	.bind(role.as_str())
	.bind(now)
	.execute(pool)
	.await?;

	if result.rows_affected() == 0 {
		return Err(AppError::conflict("user is already a member of this project"));
	}

	Ok(ProjectMember {
		project_id,
		user_id,
		role,
		created_at: now,
	})
}

pub async fn update_member_role(pool: &SqlitePool, project_id: Uuid, user_id: Uuid, role: ProjectRole) -> AppResult<()> {
	let result = sqlx::query("UPDATE project_members SET role = ? WHERE project_id = ? AND user_id = ?")
		.bind(role.as_str())
		.bind(project_id)
		.bind(user_id)
		.execute(pool)
		.await?;

	if result.rows_affected() == 0 {
		return Err(AppError::not_found("member not found"));
	}

	Ok(())
}

pub async fn remove_member(pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> AppResult<()> {
	let result = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
		.bind(project_id)
		.bind(user_id)
		.execute(pool)
		.await?;

	if result.rows_affected() == 0 {
		return Err(AppError::not_found("member not found"));
	}

	Ok(())
}

/// Whether `user_id` owns the project or appears in its member list.
pub async fn is_participant(pool: &SqlitePool, project: &Project, user_id: Uuid) -> AppResult<bool> {
	if project.owner_id == user_id {
		return Ok(true);
	}

	Ok(find_member(pool, project.id, user_id).await?.is_some())
}
