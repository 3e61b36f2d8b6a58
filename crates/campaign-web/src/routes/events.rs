//! Live event stream (SSE), one per operator.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::auth::Operator;
use crate::state::AppState;

/// Open the caller's event stream, replacing any stream they already had.
///
/// The stream ends when the client disconnects, when the operator connects
/// again, or at shutdown.
pub async fn stream(
    State(state): State<AppState>,
    operator: Operator,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(operator_id = %operator.id, "Operator stream opened");

    let events = state
        .registry
        .register(operator.id)
        .filter_map(|event| async move {
            match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            }
        });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
