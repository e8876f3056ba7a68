//! SSE endpoint
//!
//! GET /events: pushes every status transition, sensor update and device
//! snapshot refresh to connected clients.

use crate::AppState;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use beqd_common::sse::event_sse_stream;
use futures::Stream;
use std::convert::Infallible;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_sse_stream(state.shared.event_bus.subscribe())
}
