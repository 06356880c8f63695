// Run orchestration: builds a run's source, detector backends and effect
// context, registers the shared state and spawns the processing thread.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::{bail, Context, Result};
use opencv::imgcodecs;
use opencv::prelude::*;
use tracing::{error, info};

use crate::config::EffectConfig;
use crate::detect::backends::{MaskRcnnSegmenter, YoloDnnDetector};
use crate::detect::{BoxDetector, MaskSegmenter};
use crate::fx::colorize::{CaffeColorizer, Colorizer};
use crate::fx::upscale::{BlendInterpolator, CubicUpscaler};
use crate::fx::EffectCtx;
use crate::pipeline::exporter::CropExporter;
use crate::pipeline::state::{PipelineState, RunPhase, SourceKind};
use crate::pipeline::worker::{process_run, RunComponents};
use crate::run_context;
use crate::video::{FrameSource, ImageSource, VideoFileSource, VideoSink};

// Global registry of runs keyed by run id
lazy_static::lazy_static! {
    static ref RUN_REGISTRY: RwLock<HashMap<String, Arc<PipelineState>>> =
        RwLock::new(HashMap::new());
}

/// Model files for the DNN backends. A backend whose files are absent is
/// simply not constructed; its effects stay inert.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    pub yolo_cfg: Option<PathBuf>,
    pub yolo_weights: Option<PathBuf>,
    pub yolo_names: Option<PathBuf>,
    pub rcnn_graph: Option<PathBuf>,
    pub rcnn_config: Option<PathBuf>,
    pub rcnn_names: Option<PathBuf>,
    pub colorize_prototxt: Option<PathBuf>,
    pub colorize_model: Option<PathBuf>,
    pub use_cuda: bool,
}

impl ModelPaths {
    fn box_detector(&self) -> Result<Option<Box<dyn BoxDetector>>> {
        match (&self.yolo_cfg, &self.yolo_weights, &self.yolo_names) {
            (Some(cfg), Some(weights), Some(names)) => Ok(Some(Box::new(
                YoloDnnDetector::new(cfg, weights, names, self.use_cuda)?,
            ))),
            _ => Ok(None),
        }
    }

    fn mask_segmenter(&self) -> Result<Option<Box<dyn MaskSegmenter>>> {
        match (&self.rcnn_graph, &self.rcnn_config, &self.rcnn_names) {
            (Some(graph), Some(config), Some(names)) => Ok(Some(Box::new(
                MaskRcnnSegmenter::new(graph, config, names, self.use_cuda)?,
            ))),
            _ => Ok(None),
        }
    }

    fn colorizer(&self) -> Result<Option<Box<dyn Colorizer>>> {
        match (&self.colorize_prototxt, &self.colorize_model) {
            (Some(prototxt), Some(model)) => Ok(Some(Box::new(CaffeColorizer::new(
                prototxt,
                model,
                self.use_cuda,
            )?))),
            _ => Ok(None),
        }
    }
}

pub struct RunRequest {
    pub source_path: PathBuf,
    pub source_name: String,
    pub output_root: PathBuf,
    pub background_path: Option<PathBuf>,
    pub record: bool,
    pub upscale_factor: f64,
}

pub fn get_run(run_id: &str) -> Option<Arc<PipelineState>> {
    RUN_REGISTRY
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(run_id)
        .cloned()
}

fn register_run(state: Arc<PipelineState>) {
    info!(run_id = %state.run_id, "registering run");
    let mut registry = RUN_REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    // Finished runs are dropped here; the registry holds only live runs and
    // the ones still streaming their last frames
    registry.retain(|_, existing| !existing.output.is_finished());
    registry.insert(state.run_id.clone(), state);
}

/// Build a run and spawn its processing thread. The returned state is the
/// only handle the web layer needs.
pub fn start_run(
    req: RunRequest,
    models: &ModelPaths,
    config: Arc<RwLock<EffectConfig>>,
) -> Result<Arc<PipelineState>> {
    if !req.source_path.exists() {
        bail!("source not found at {}", req.source_path.display());
    }
    let Some(kind) = run_context::source_kind_of(&req.source_path) else {
        bail!("unsupported source type: {}", req.source_path.display());
    };

    let source: Box<dyn FrameSource> = match kind {
        SourceKind::Video => {
            let path = req
                .source_path
                .to_str()
                .context("non-utf8 source path")?;
            Box::new(VideoFileSource::open(path)?)
        }
        SourceKind::Image => Box::new(ImageSource::open(&req.source_path)?),
    };

    let meta = run_context::create_run(&req.output_root, &req.source_name)?;

    let background = match &req.background_path {
        Some(path) => {
            let img = imgcodecs::imread_def(path.to_str().context("non-utf8 background path")?)?;
            if img.empty() {
                bail!("failed to decode background image: {}", path.display());
            }
            Some(img)
        }
        None => None,
    };

    let parts = RunComponents {
        box_detector: models.box_detector()?,
        mask_segmenter: models.mask_segmenter()?,
        interpolator: Some(Box::new(BlendInterpolator)),
        ctx: EffectCtx::new(
            background,
            Some(Box::new(CubicUpscaler {
                factor: req.upscale_factor,
            })),
            models.colorizer()?,
        ),
        sink: VideoSink::new(meta.output_video_path(), source.fps()),
        exporter: CropExporter::new(meta.archive_path()),
        source,
    };

    let state = Arc::new(PipelineState::new(
        meta.run_id.clone(),
        kind,
        parts.source.total_frames(),
        config,
    ));
    if req.record {
        state.set_phase(RunPhase::Recording);
    }

    register_run(Arc::clone(&state));

    {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            info!(run_id = %state.run_id, "processing thread started");
            if let Err(err) = process_run(Arc::clone(&state), parts) {
                error!(run_id = %state.run_id, %err, "processing run failed");
            } else {
                info!(run_id = %state.run_id, "processing run finished");
            }
        });
    }

    Ok(state)
}

/// Request a run to stop. Returns false for unknown run ids.
pub fn stop_run(run_id: &str) -> bool {
    match get_run(run_id) {
        Some(state) => {
            state.request_stop();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    #[test]
    fn registry_round_trip() {
        let state = Arc::new(PipelineState::new(
            "registry-test".to_string(),
            SourceKind::Video,
            10,
            Arc::new(RwLock::new(EffectConfig::default())),
        ));
        register_run(Arc::clone(&state));

        assert!(get_run("registry-test").is_some());
        assert!(stop_run("registry-test"));
        assert!(state.stop_requested());
        assert!(!stop_run("no-such-run"));
    }

    #[test]
    fn finished_runs_are_evicted_on_registration() {
        let finished = Arc::new(PipelineState::new(
            "finished-run".to_string(),
            SourceKind::Video,
            10,
            Arc::new(RwLock::new(EffectConfig::default())),
        ));
        finished.output.finish();
        register_run(finished);

        let live = Arc::new(PipelineState::new(
            "live-run".to_string(),
            SourceKind::Video,
            10,
            Arc::new(RwLock::new(EffectConfig::default())),
        ));
        register_run(live);

        assert!(get_run("finished-run").is_none());
        assert!(get_run("live-run").is_some());
    }

    #[test]
    fn incomplete_model_paths_build_no_backend() {
        let models = ModelPaths {
            yolo_cfg: Some(PathBuf::from("only-the-cfg.cfg")),
            ..ModelPaths::default()
        };
        assert!(models.box_detector().unwrap().is_none());
        assert!(models.mask_segmenter().unwrap().is_none());
        assert!(models.colorizer().unwrap().is_none());
    }
}
