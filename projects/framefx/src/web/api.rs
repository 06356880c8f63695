use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::EffectConfig;
use crate::pipeline::orchestrator::{self, RunRequest};
use crate::run_context::{self, SourceEntry};
use crate::web::AppContext;

#[derive(Deserialize)]
pub struct StartRequest {
    /// Source name relative to the media root, as listed by /api/sources.
    pub source: String,
    #[serde(default)]
    pub record: bool,
}

pub async fn get_status(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    match ctx.current_run() {
        Some(run) => Json(run.status_json()),
        None => Json(json!({ "run_id": null, "phase": "idle", "finished": true })),
    }
}

pub async fn get_sources(State(ctx): State<Arc<AppContext>>) -> Json<Vec<SourceEntry>> {
    Json(run_context::list_sources(&ctx.media_root))
}

pub async fn get_config(State(ctx): State<Arc<AppContext>>) -> Json<EffectConfig> {
    Json(ctx.config.read().unwrap_or_else(|e| e.into_inner()).clone())
}

/// Replace the shared effect configuration. The processing loop snapshots
/// the record per frame, so changes apply to the very next frame.
pub async fn set_config(
    State(ctx): State<Arc<AppContext>>,
    Json(config): Json<EffectConfig>,
) -> Json<EffectConfig> {
    *ctx.config.write().unwrap_or_else(|e| e.into_inner()) = config.clone();
    Json(config)
}

pub async fn start_run(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if let Some(run) = ctx.current_run() {
        if !run.output.is_finished() {
            return Err((
                StatusCode::CONFLICT,
                format!("run {} is still active", run.run_id),
            ));
        }
    }

    let req = RunRequest {
        source_path: ctx.media_root.join(&payload.source),
        source_name: payload.source.clone(),
        output_root: ctx.output_root.clone(),
        background_path: ctx.background_path.clone(),
        record: payload.record,
        upscale_factor: ctx.upscale_factor,
    };

    let state = orchestrator::start_run(req, &ctx.models, Arc::clone(&ctx.config))
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    info!(run_id = %state.run_id, source = %payload.source, record = payload.record, "run started");

    ctx.set_current_run(Arc::clone(&state));
    Ok(Json(state.status_json()))
}

pub async fn stop_run(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match ctx.current_run() {
        Some(run) => {
            run.request_stop();
            info!(run_id = %run.run_id, "stop requested over API");
            Ok(Json(run.status_json()))
        }
        None => Err((StatusCode::NOT_FOUND, "no active run".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::ModelPaths;

    fn context(dir: &tempfile::TempDir) -> Arc<AppContext> {
        Arc::new(AppContext::new(
            dir.path().to_path_buf(),
            dir.path().join("out"),
            None,
            4.0,
            ModelPaths::default(),
        ))
    }

    #[tokio::test]
    async fn status_without_a_run_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let Json(status) = get_status(State(ctx)).await;
        assert_eq!(status["phase"], "idle");
        assert!(status["run_id"].is_null());
    }

    #[tokio::test]
    async fn config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let mut cfg = EffectConfig::default();
        cfg.sobel = true;
        cfg.brightness = 25;
        let Json(returned) = set_config(State(Arc::clone(&ctx)), Json(cfg)).await;
        assert!(returned.sobel);

        let Json(read_back) = get_config(State(ctx)).await;
        assert!(read_back.sobel);
        assert_eq!(read_back.brightness, 25);
    }

    #[tokio::test]
    async fn start_rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let result = start_run(
            State(ctx),
            Json(StartRequest {
                source: "nope.mp4".to_string(),
                record: false,
            }),
        )
        .await;
        assert_eq!(result.unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stop_without_a_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let result = stop_run(State(ctx)).await;
        assert_eq!(result.unwrap_err().0, StatusCode::NOT_FOUND);
    }
}
