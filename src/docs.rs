use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};

use crate::{authz, automation, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::projects::list_projects,
		routes::projects::create_project,
		routes::projects::get_project,
		routes::projects::update_project,
		routes::projects::delete_project,
		routes::members::list_members,
		routes::members::add_member,
		routes::members::update_member,
		routes::members::remove_member,
		routes::tasks::list_tasks,
		routes::tasks::get_task,
		routes::tasks::create_task,
		routes::tasks::update_task,
		routes::tasks::delete_task,
		routes::comments::list_comments,
		routes::comments::add_comment,
		routes::automations::list_automations,
		routes::automations::get_automation,
		routes::automations::create_automation,
		routes::automations::update_automation,
		routes::automations::enable_automation,
		routes::automations::disable_automation,
		routes::automations::delete_automation,
		routes::notifications::list_notifications,
		routes::notifications::mark_notification_read,
		routes::users::list_badges,
		routes::events::project_stream
	),
	components(
		schemas(
			models::user::User,
			models::user::Badge,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::project::ProjectUpdateRequest,
			models::project::ProjectMember,
			models::project::MemberAddRequest,
			models::project::MemberUpdateRequest,
			models::task::Task,
			models::task::Priority,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::comment::Comment,
			models::comment::CommentCreateRequest,
			models::notification::Notification,
			models::notification::NotificationCategory,
			automation::AutomationRule,
			automation::AutomationCreateRequest,
			automation::AutomationUpdateRequest,
			automation::TriggerType,
			authz::ProjectRole,
			routes::MessageResponse,
			routes::health::HealthResponse
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Health", description = "Liveness and database check"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Projects", description = "Project management"),
		(name = "Members", description = "Project membership and roles"),
		(name = "Tasks", description = "Task management"),
		(name = "Comments", description = "Task comments"),
		(name = "Automations", description = "Project automation rules"),
		(name = "Notifications", description = "Per-user notifications"),
		(name = "Users", description = "User badges"),
		(name = "Realtime", description = "Server-sent project events")
	)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
		);
	}
}

/// The document with a local server entry for `port`.
pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
	Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_automation_paths() {
		let doc = ApiDoc::openapi();
		assert!(doc.paths.paths.contains_key("/projects/{id}/automations"));
		assert!(doc.paths.paths.contains_key("/projects/{id}/automations/{rule_id}/enable"));
	}

	#[test]
	fn bearer_scheme_is_registered() {
		let doc = ApiDoc::openapi();
		let components = doc.components.expect("components");
		assert!(components.security_schemes.contains_key("bearerAuth"));
	}
}
