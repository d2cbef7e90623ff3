//! Server-Sent Events for a single scan job
//!
//! Push alternative to polling `GET /scan/:id`. Every event carries the same
//! snapshot JSON as the status endpoint; the stream ends after the terminal
//! snapshot.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

use super::scan::parse_job_id;
use crate::error::{ApiError, ApiResult};
use crate::models::JobStatus;
use crate::AppState;

/// SSE event name for job snapshots
pub const SNAPSHOT_EVENT: &str = "snapshot";

fn snapshot_event(status: &JobStatus) -> Option<Event> {
    match serde_json::to_string(status) {
        Ok(json) => Some(Event::default().event(SNAPSHOT_EVENT).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize snapshot: {}", e);
            None
        }
    }
}

/// GET /scan/:id/events
pub async fn scan_event_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id = parse_job_id(&id)?;

    // Subscribe before the first read so no change slips between the two
    let mut rx = state.registry.event_bus().subscribe();
    let initial = state
        .registry
        .status(&job_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))?;

    info!(job_id = %job_id, "SSE client subscribed to scan job");
    let key = job_id.to_string();
    let registry = state.registry.clone();

    let stream = async_stream::stream! {
        let terminal = initial.is_terminal();
        if let Some(event) = snapshot_event(&initial) {
            yield Ok(event);
        }
        if terminal {
            return;
        }

        loop {
            let final_event = match rx.recv().await {
                Ok(event) if event.job_id() != key => continue,
                Ok(event) => {
                    trace!(job_id = %job_id, event = event.event_type(), "SSE: Job event");
                    event.is_terminal()
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(job_id = %job_id, skipped, "SSE: Subscriber lagged");
                    false
                }
                Err(RecvError::Closed) => break,
            };

            // Always re-read: the registry holds the authoritative snapshot
            let Some(status) = registry.status(&job_id).await else {
                debug!(job_id = %job_id, "SSE: Job no longer tracked");
                break;
            };
            let terminal = final_event || status.is_terminal();
            if let Some(event) = snapshot_event(&status) {
                yield Ok(event);
            }
            if terminal {
                debug!(job_id = %job_id, "SSE: Terminal snapshot sent");
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// Build scan event routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/scan/:id/events", get(scan_event_stream))
}
