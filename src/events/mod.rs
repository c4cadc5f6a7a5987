//! Realtime publish bus.
//!
//! Controllers publish to a topic after a mutation (including mutations made
//! by automations during the same request). The automation core itself never
//! publishes. Subscribers (the SSE endpoint) filter by topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod publishable;
pub use publishable::Publishable;

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub topic: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(
        topic: impl Into<String>,
        name: impl Into<String>,
        actor_id: Option<Uuid>,
        subject_id: Option<Uuid>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            topic: topic.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<DomainEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent>) {
    broadcast::channel(BUS_CAPACITY)
}

pub fn project_topic(project_id: Uuid) -> String {
    format!("project:{project_id}")
}

pub fn user_topic(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// Fire and forget: having no subscribers is not an error.
pub fn publish(bus: &EventBus, event: DomainEvent) {
    let name = event.name.clone();
    if bus.send(event).is_err() {
        tracing::trace!(event = %name, "no realtime subscribers");
    }
}

/// Publishes `<entity>.<action>` with the serialized entity on its project topic.
pub fn publish_entity<T: Publishable>(bus: &EventBus, action: &str, actor_id: Option<Uuid>, entity: &T) {
    let payload = match serde_json::to_value(entity) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, entity = T::entity_type(), "failed to serialize realtime payload");
            return;
        }
    };

    let event = DomainEvent::new(
        project_topic(entity.project_id()),
        format!("{}.{}", T::entity_type(), action),
        actor_id,
        Some(entity.subject_id()),
        payload,
    );

    publish(bus, event);
}
