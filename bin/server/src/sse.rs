//! `GET /runs/{id}/events/stream`: resumable Server-Sent Events.
//!
//! Subscribes to the Run's broadcast channel before reading the replay
//! window, so no event appended between the two can be missed; replayed and
//! live events are then deduplicated by id as they're interleaved. The
//! stream closes itself right after forwarding a terminal event — callers
//! never have to detect a dangling connection to know a Run is done.

use crate::error::ApiError;
use crate::state::AppState;
use agent_runner_core::{EventId, RunId};
use agent_runner_store::Event as RunEvent;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Deserialize)]
pub struct StreamQuery {
    pub after_id: Option<i64>,
}

pub async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let run_id = RunId::from_str(&id).map_err(|e| ApiError::validation(format!("invalid run id: {e}")))?;

    if state.store.get_run(run_id).await?.is_none() {
        return Err(ApiError::NotFound { what: "run", id });
    }

    let receiver = state.store.subscribe(run_id);
    let after = query.after_id.map(EventId::new);
    let replay = state.store.list_events(run_id, after, None).await?;
    let last_replayed = replay.last().map(|e| e.id).or(after);

    let live = stream::unfold((receiver, last_replayed), move |(mut rx, mut last_id)| async move {
        loop {
            match rx.recv().await {
                Ok(event) if last_id.is_none_or(|last| event.id > last) => {
                    last_id = Some(event.id);
                    return Some((event, (rx, last_id)));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    let combined = stream::iter(replay).chain(live);

    let bounded = combined.scan(false, |done, event| {
        if *done {
            return futures::future::ready(None);
        }
        if is_terminal_event(&event.event_type) {
            *done = true;
        }
        futures::future::ready(Some(event))
    });

    let sse_stream = bounded.map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL).text("keepalive")))
}

fn is_terminal_event(event_type: &str) -> bool {
    matches!(
        event_type,
        agent_runner_store::event_type::RUN_COMPLETED
            | agent_runner_store::event_type::RUN_FAILED
            | agent_runner_store::event_type::RUN_STOPPED
    )
}

fn to_sse_event(event: &RunEvent) -> SseEvent {
    let data = serde_json::to_string(event).expect("Event contains only JSON-representable fields");
    SseEvent::default()
        .id(event.id.to_string())
        .event(event.event_type.clone())
        .data(data)
}
