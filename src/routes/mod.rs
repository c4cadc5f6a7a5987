use serde::Serialize;
use utoipa::ToSchema;

pub mod auth;
pub mod automations;
pub mod comments;
pub mod events;
pub mod health;
pub mod members;
pub mod notifications;
pub mod projects;
pub mod tasks;
pub mod users;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
