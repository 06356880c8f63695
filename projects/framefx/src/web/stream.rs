// MJPEG preview stream. Each part carries the latest published JPEG; parts
// are emitted only when the sequence number advances, so a stalled pipeline
// does not flood clients with duplicates. The stream ends when the run's
// publisher is marked finished.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::web::AppContext;

const BOUNDARY: &str = "frame";
const TICK: Duration = Duration::from_millis(33);

fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

pub async fn stream_mjpg(State(ctx): State<Arc<AppContext>>) -> Response {
    let Some(run) = ctx.current_run() else {
        return (StatusCode::NOT_FOUND, "no active run").into_response();
    };

    let body = stream! {
        let mut ticker = tokio::time::interval(TICK);
        let mut last_seq = 0u64;
        loop {
            ticker.tick().await;
            if let Some((jpeg, seq)) = run.output.latest() {
                if seq != last_seq {
                    last_seq = seq;
                    yield Ok::<Bytes, Infallible>(multipart_chunk(&jpeg));
                }
            }
            if run.output.is_finished() {
                break;
            }
        }
    };

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Latest single frame as a plain JPEG, for poll-style clients.
pub async fn latest_frame(State(ctx): State<Arc<AppContext>>) -> Response {
    let Some(run) = ctx.current_run() else {
        return (StatusCode::NOT_FOUND, "no active run").into_response();
    };
    match run.output.latest() {
        Some((jpeg, _)) => (
            [(header::CONTENT_TYPE, "image/jpeg")],
            Bytes::from(jpeg.to_vec()),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
