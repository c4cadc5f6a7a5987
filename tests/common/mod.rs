#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use taskboard::authz::ProjectRole;
use taskboard::automation::{Action, AutomationRule, AutomationStore, RuleDraft, Trigger};
use taskboard::db::{projects, tasks, users};
use taskboard::errors::{AppError, AppResult};
use taskboard::models::notification::NewNotification;
use taskboard::models::project::{Project, DEFAULT_STATUSES};
use taskboard::models::task::{Priority, Task};
use taskboard::notifications::NotificationSink;
use taskboard::utils::utc_now;

/// Keeps the temp dir alive for as long as the pool is used.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn setup_db() -> Result<TestDb> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok(TestDb { pool, _dir: dir })
}

pub async fn seed_user(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let email = format!("{}-{}@example.com", name.to_lowercase(), id.simple());
    users::insert_user(pool, id, name, &email, "not-a-real-hash", utc_now()).await?;
    Ok(id)
}

pub async fn seed_project(pool: &SqlitePool, owner_id: Uuid) -> Result<Project> {
    seed_project_with_statuses(pool, owner_id, &DEFAULT_STATUSES).await
}

pub async fn seed_project_with_statuses(pool: &SqlitePool, owner_id: Uuid, statuses: &[&str]) -> Result<Project> {
    let now = utc_now();
    let project = Project {
        id: Uuid::new_v4(),
        owner_id,
        name: "Board".to_string(),
        description: None,
        theme_color: "#3498db".to_string(),
        statuses: statuses.iter().map(|s| s.to_string()).collect(),
        created_at: now,
        updated_at: now,
    };
    projects::insert_project(pool, &project).await?;
    Ok(project)
}

pub async fn add_member(pool: &SqlitePool, project_id: Uuid, user_id: Uuid, role: ProjectRole) -> Result<()> {
    projects::insert_member(pool, project_id, user_id, role, utc_now()).await?;
    Ok(())
}

pub struct TaskSeed<'a> {
    pub status: &'a str,
    pub assignee: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl Default for TaskSeed<'_> {
    fn default() -> Self {
        Self {
            status: "To Do",
            assignee: None,
            due_date: None,
            tags: Vec::new(),
        }
    }
}

pub async fn seed_task(pool: &SqlitePool, project: &Project, seed: TaskSeed<'_>) -> Result<Task> {
    let now = utc_now();
    let task = Task {
        id: Uuid::new_v4(),
        project_id: project.id,
        title: "Task".to_string(),
        description: None,
        status: seed.status.to_string(),
        priority: Priority::Medium,
        due_date: seed.due_date,
        assignee: seed.assignee,
        tags: seed.tags,
        created_by: project.owner_id,
        created_at: now,
        updated_at: now,
    };
    tasks::insert_task(pool, &task).await?;
    Ok(task)
}

/// Creates a rule through the store from JSON trigger/action documents.
pub async fn seed_rule(pool: &SqlitePool, project: &Project, name: &str, trigger: Value, actions: Value) -> Result<AutomationRule> {
    let draft = RuleDraft {
        name: name.to_string(),
        trigger: serde_json::from_value::<Trigger>(trigger)?,
        actions: serde_json::from_value::<Vec<Action>>(actions)?,
        active: true,
    };
    let rule = AutomationStore::new(pool.clone())
        .create(project, project.owner_id, draft)
        .await?;
    Ok(rule)
}

/// Inserts a rule row directly, bypassing write-time validation.
pub async fn insert_raw_rule(pool: &SqlitePool, project_id: Uuid, trigger_type: &str, trigger: Value, actions: Value) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO automations (id, project_id, name, trigger_type, trigger, actions, active, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(id)
    .bind(project_id)
    .bind("raw rule")
    .bind(trigger_type)
    .bind(trigger.to_string())
    .bind(actions.to_string())
    .bind(Uuid::new_v4())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Captures notifications in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<NewNotification>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.iter().map(|n| n.message.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn enqueue(&self, notification: NewNotification) -> AppResult<()> {
        self.sent
            .lock()
            .map_err(|_| AppError::internal("sink poisoned"))?
            .push(notification);
        Ok(())
    }
}

/// Rejects every notification.
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn enqueue(&self, _notification: NewNotification) -> AppResult<()> {
        Err(AppError::internal("notification backend unavailable"))
    }
}

pub fn recording() -> Arc<RecordingSink> {
    Arc::new(RecordingSink::default())
}

/// Sends one request through the router and decodes the JSON body (Null when empty).
pub async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, value))
}
