//! Newline-delimited JSON streaming responses.

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// One serialized value followed by `\n`.
pub fn to_line<T: Serialize>(value: &T) -> String {
    let mut line = serde_json::to_string(value).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "error": e.to_string() }).to_string()
    });
    line.push('\n');
    line
}

/// Streams pre-serialized lines to the client as they are produced.
pub fn ndjson_response<S>(lines: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    let body = Body::from_stream(lines.map(|line| Ok::<_, Infallible>(Bytes::from(line))));
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
