// HTTP surface: JSON control API plus the MJPEG preview stream. Handlers
// only read published frames and swap the shared config record; all frame
// work stays on the processing thread.

pub mod api;
pub mod server;
pub mod stream;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::EffectConfig;
use crate::pipeline::orchestrator::ModelPaths;
use crate::pipeline::state::PipelineState;

pub struct AppContext {
    pub media_root: PathBuf,
    pub output_root: PathBuf,
    pub background_path: Option<PathBuf>,
    pub upscale_factor: f64,
    pub models: ModelPaths,
    pub config: Arc<RwLock<EffectConfig>>,
    current_run: Mutex<Option<Arc<PipelineState>>>,
}

impl AppContext {
    pub fn new(
        media_root: PathBuf,
        output_root: PathBuf,
        background_path: Option<PathBuf>,
        upscale_factor: f64,
        models: ModelPaths,
    ) -> Self {
        Self {
            media_root,
            output_root,
            background_path,
            upscale_factor,
            models,
            config: Arc::new(RwLock::new(EffectConfig::default())),
            current_run: Mutex::new(None),
        }
    }

    pub fn current_run(&self) -> Option<Arc<PipelineState>> {
        self.current_run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_current_run(&self, run: Arc<PipelineState>) {
        *self.current_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(run);
    }
}
