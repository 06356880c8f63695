// Shared per-run state. Raw fields stay private; readers go through snapshot
// accessors that take and release the lock internally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::config::EffectConfig;
use crate::pipeline::publisher::FramePublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Previewing: frames are processed and streamed, nothing is persisted.
    Idle,
    /// Recording: frames additionally go to the video sink and the exporter.
    Recording,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Video,
    Image,
}

pub struct PipelineState {
    pub run_id: String,
    pub source_kind: SourceKind,
    pub total_frames: u64,
    pub output: FramePublisher,
    stop: AtomicBool,
    phase: Mutex<RunPhase>,
    config: Arc<RwLock<EffectConfig>>,
}

impl PipelineState {
    pub fn new(
        run_id: String,
        source_kind: SourceKind,
        total_frames: u64,
        config: Arc<RwLock<EffectConfig>>,
    ) -> Self {
        Self {
            run_id,
            source_kind,
            total_frames,
            output: FramePublisher::new(),
            stop: AtomicBool::new(false),
            phase: Mutex::new(RunPhase::Idle),
            config,
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Per-frame snapshot of the effect configuration. The web layer may
    /// replace the record between frames without restarting the run.
    pub fn config_snapshot(&self) -> EffectConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "source_kind": self.source_kind,
            "phase": self.phase(),
            "finished": self.output.is_finished(),
            "stats": self.output.stats(),
        })
    }
}
