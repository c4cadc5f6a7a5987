use serde::Serialize;
use uuid::Uuid;

/// Entities that can be pushed to connected clients after a mutation.
pub trait Publishable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "task" in "task.updated"
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    /// Project whose topic receives the event
    fn project_id(&self) -> Uuid;
}
