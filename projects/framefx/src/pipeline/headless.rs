// Headless rendering: start a recording run and block until it completes,
// reporting progress on the terminal instead of over HTTP.

use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::EffectConfig;
use crate::pipeline::orchestrator::{self, ModelPaths, RunRequest};
use crate::pipeline::state::SourceKind;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Render one source to completion. A still image is composed exactly once;
/// a video runs until the source is exhausted.
pub fn render(
    req: RunRequest,
    models: &ModelPaths,
    config: Arc<RwLock<EffectConfig>>,
) -> Result<()> {
    let state = orchestrator::start_run(req, models, config)?;

    let pb = ProgressBar::new(state.total_frames.max(1));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
            .progress_chars("#>-"),
    );

    while !state.output.is_finished() {
        let stats = state.output.stats();
        pb.set_position(stats.frames_processed);
        // A still-image source never exhausts on its own
        if state.source_kind == SourceKind::Image && stats.frames_processed >= 1 {
            state.request_stop();
        }
        thread::sleep(POLL_INTERVAL);
    }

    let stats = state.output.stats();
    pb.set_position(stats.frames_processed);
    pb.finish_with_message("Done");
    info!(
        run_id = %state.run_id,
        frames = stats.frames_processed,
        "render complete"
    );

    Ok(())
}
