//! Generation progress, as a snapshot or as a stream of snapshots.

use std::sync::Arc;

use axum::{extract::State, response::Response, Json};
use futures::StreamExt;
use likeness_services::GroupProgress;
use serde::Serialize;
use tokio_stream::wrappers::WatchStream;

use crate::ndjson::{ndjson_response, to_line};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "progress")]
struct ProgressLine {
    groups: Vec<GroupProgress>,
}

/// Current per-username progress groups
#[utoipa::path(
    get,
    path = "/api/progress",
    tag = "progress",
    responses(
        (status = 200, description = "Progress groups", body = inline(Object))
    )
)]
pub async fn get_progress(State(state): State<Arc<AppState>>) -> Json<Vec<GroupProgress>> {
    Json(state.progress.current())
}

/// NDJSON stream with one line per recompute
#[utoipa::path(
    get,
    path = "/api/progress/stream",
    tag = "progress",
    responses(
        (status = 200, description = "NDJSON progress stream", content_type = "application/x-ndjson")
    )
)]
pub async fn stream_progress(State(state): State<Arc<AppState>>) -> Response {
    let snapshots = WatchStream::new(state.progress.subscribe());
    ndjson_response(snapshots.map(|groups| to_line(&ProgressLine { groups })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_is_tagged() {
        let line = to_line(&ProgressLine { groups: vec![] });
        assert_eq!(line, "{\"type\":\"progress\",\"groups\":[]}\n");
    }
}
