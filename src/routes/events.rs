use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{BoxStream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{actions, Resource};
use crate::errors::AppResult;
use crate::events::{project_topic, user_topic, DomainEvent};
use crate::jwt::AuthUser;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Live events of one project plus the caller's own notifications.
///
/// Each SSE message uses the event name (`task.updated`, ...) as its `event`
/// field and the serialized `DomainEvent` as data. Lagging subscribers lose
/// the missed events and keep streaming.
#[utoipa::path(
    get,
    path = "/projects/{id}/events",
    tag = "Realtime",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "text/event-stream of project events"),
        (status = 403, description = "Not a project member")
    )
)]
pub async fn project_stream(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Sse<BoxStream<'static, Result<Event, Infallible>>>> {
    state
        .gate
        .require(auth.user_id, project_id, Resource::Project, actions::VIEW)
        .await?;

    let topics = [project_topic(project_id), user_topic(auth.user_id)];
    tracing::debug!(user_id = %auth.user_id, project_id = %project_id, "realtime subscriber attached");

    let stream = BroadcastStream::new(state.event_bus.subscribe())
        .filter_map(move |received| {
            let event = match received {
                Ok(event) if topics.contains(&event.topic) => Some(event),
                Ok(_) => None,
                Err(err) => {
                    tracing::debug!(error = %err, "realtime subscriber lagged");
                    None
                }
            };
            async move { event.and_then(to_sse) }
        })
        .map(Ok::<_, Infallible>)
        .boxed();

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

fn to_sse(event: DomainEvent) -> Option<Event> {
    match Event::default().event(event.name.clone()).json_data(&event) {
        Ok(sse) => Some(sse),
        Err(err) => {
            tracing::warn!(event = %event.name, error = %err, "failed to encode realtime event");
            None
        }
    }
}
