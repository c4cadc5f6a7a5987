use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::PermissionGate;
use crate::automation::AutomationEngine;
use crate::docs;
use crate::errors::AppError;
use crate::events::{init_event_bus, EventBus};
use crate::jwt::JwtConfig;
use crate::notifications::{NotificationSink, SqliteNotificationSink};
use crate::routes::{auth, automations, comments, events, health, members, notifications, projects, tasks, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub gate: PermissionGate,
    pub engine: AutomationEngine,
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        let (event_bus, _) = init_event_bus();
        let notifier: Arc<dyn NotificationSink> = Arc::new(SqliteNotificationSink::new(pool.clone(), event_bus.clone()));
        Self::with_notifier(pool, jwt, event_bus, notifier)
    }

    /// Wires the state around a caller-supplied notification sink.
    pub fn with_notifier(
        pool: SqlitePool,
        jwt: JwtConfig,
        event_bus: EventBus,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            gate: PermissionGate::new(pool.clone()),
            engine: AutomationEngine::new(pool.clone(), Arc::clone(&notifier)),
            pool,
            jwt: Arc::new(jwt),
            event_bus,
            notifier,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    Ok(build_router(AppState::new(pool, jwt_config)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/:id/members", get(members::list_members).post(members::add_member))
        .route(
            "/:id/members/:user_id",
            put(members::update_member).delete(members::remove_member),
        )
        .route("/:id/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:id/tasks/:task_id",
            get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task),
        )
        .route(
            "/:id/tasks/:task_id/comments",
            get(comments::list_comments).post(comments::add_comment),
        )
        .route(
            "/:id/automations",
            get(automations::list_automations).post(automations::create_automation),
        )
        .route(
            "/:id/automations/:rule_id",
            get(automations::get_automation)
                .put(automations::update_automation)
                .delete(automations::delete_automation),
        )
        .route("/:id/automations/:rule_id/enable", post(automations::enable_automation))
        .route("/:id/automations/:rule_id/disable", post(automations::disable_automation))
        .route("/:id/events", get(events::project_stream));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/:id/read", post(notifications::mark_notification_read))
        .route("/users/:id/badges", get(users::list_badges))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    router
}
