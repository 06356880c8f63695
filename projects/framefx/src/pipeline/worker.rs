// The processing loop: one strictly sequential thread per run. Each
// iteration reads a frame, runs the enabled detectors, composes the effect
// chain, records stats, persists (when recording) and publishes the encoded
// frame. Inference and encoding happen entirely outside the publisher lock.

use std::sync::Arc;

use anyhow::Result;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use tracing::{info, warn};

use crate::detect::adapter::{detect_boxes, detect_masks};
use crate::detect::{BoxDetector, DetectionSet, MaskSegmenter};
use crate::fx::hud::draw_hud;
use crate::fx::upscale::FrameInterpolator;
use crate::fx::{apply_chain, EffectCtx};
use crate::pipeline::exporter::CropExporter;
use crate::pipeline::state::{PipelineState, RunPhase};
use crate::pipeline::stats::StatsTracker;
use crate::video::{FrameSource, VideoSink};

/// Everything a run owns besides its shared state. Built by the orchestrator
/// and moved onto the processing thread.
pub struct RunComponents {
    pub source: Box<dyn FrameSource>,
    pub box_detector: Option<Box<dyn BoxDetector>>,
    pub mask_segmenter: Option<Box<dyn MaskSegmenter>>,
    pub interpolator: Option<Box<dyn FrameInterpolator>>,
    pub ctx: EffectCtx,
    pub sink: VideoSink,
    pub exporter: CropExporter,
}

pub fn process_run(state: Arc<PipelineState>, mut parts: RunComponents) -> Result<()> {
    let result = run_loop(&state, &mut parts);

    // Resources are released on every exit path; the publisher is marked
    // finished so streams terminate.
    if let Err(err) = parts.sink.release() {
        warn!(%err, "releasing video sink failed");
    }
    if let Err(err) = parts.exporter.finish() {
        warn!(%err, "closing crop archive failed");
    }
    state.output.finish();
    state.set_phase(RunPhase::Stopped);

    result
}

fn run_loop(state: &Arc<PipelineState>, parts: &mut RunComponents) -> Result<()> {
    let mut tracker = StatsTracker::new(state.total_frames);
    let mut prev_written: Option<Mat> = None;

    loop {
        if state.stop_requested() {
            info!(run_id = %state.run_id, "stop requested, ending run");
            break;
        }

        let Some(frame) = parts.source.next_frame()? else {
            info!(run_id = %state.run_id, "source exhausted, ending run");
            break;
        };

        let cfg = state.config_snapshot();
        let threshold = cfg.confidence_fraction();

        // A detector failure spoils only this frame; the frame is published
        // without annotations and the loop continues
        let boxes = match (cfg.use_box_detector, parts.box_detector.as_mut()) {
            (true, Some(detector)) => match detect_boxes(&frame, detector.as_mut(), threshold) {
                Ok(set) => set,
                Err(err) => {
                    warn!(%err, "box detector failed for this frame");
                    DetectionSet::default()
                }
            },
            _ => DetectionSet::default(),
        };
        let masks = match (cfg.use_mask_segmenter, parts.mask_segmenter.as_mut()) {
            (true, Some(segmenter)) => match detect_masks(&frame, segmenter.as_mut(), threshold) {
                Ok(set) => set,
                Err(err) => {
                    warn!(%err, "mask segmenter failed for this frame");
                    DetectionSet::default()
                }
            },
            _ => DetectionSet::default(),
        };

        // The chain can fail mid-frame (a model backend erroring, or an
        // upscaled frame feeding a size-sensitive stage); the frame falls
        // back to the unprocessed input and the run keeps going
        let mut composed = match apply_chain(&frame, &boxes, &masks, &cfg, &mut parts.ctx) {
            Ok(out) => out,
            Err(err) => {
                warn!(%err, "effect chain failed for this frame");
                parts.ctx.take_extracted();
                frame.try_clone()?
            }
        };
        let stats = tracker.record(&boxes, &masks);
        draw_hud(&mut composed, &stats)?;

        let phase = state.phase();
        if phase == RunPhase::Recording {
            if cfg.interpolate {
                if let (Some(interp), Some(prev)) =
                    (parts.interpolator.as_mut(), prev_written.as_ref())
                {
                    // Consecutive frames can differ in size when upscaling
                    // toggles mid-run; only the mid-frame is skipped
                    match interp.interpolate(prev, &composed) {
                        Ok(mid) => parts.sink.write(&mid)?,
                        Err(err) => warn!(%err, "frame interpolation failed"),
                    }
                }
            }
            parts.sink.write(&composed)?;
            prev_written = Some(composed.try_clone()?);
            parts
                .exporter
                .export(parts.ctx.take_extracted(), phase, parts.source.kind())?;
        } else {
            // Preview crops are never persisted
            parts.ctx.take_extracted();
        }

        let mut encoded = Vector::<u8>::new();
        imgcodecs::imencode_def(".jpg", &composed, &mut encoded)?;
        state.output.publish(encoded.to_vec(), stats);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectConfig;
    use crate::fx::upscale::Upscaler;
    use crate::pipeline::state::SourceKind;
    use crate::video::ImageSource;
    use anyhow::bail;
    use opencv::core::{Scalar, CV_8UC3};
    use std::sync::RwLock;
    use std::thread;
    use std::time::Duration;

    struct BrokenUpscaler;

    impl Upscaler for BrokenUpscaler {
        fn upscale(&mut self, _frame: &Mat) -> Result<Mat> {
            bail!("upscale backend unavailable")
        }
    }

    fn components(dir: &tempfile::TempDir) -> RunComponents {
        let image =
            Mat::new_rows_cols_with_default(60, 80, CV_8UC3, Scalar::all(70.0)).unwrap();
        RunComponents {
            source: Box::new(ImageSource::from_mat(image)),
            box_detector: None,
            mask_segmenter: None,
            interpolator: None,
            ctx: EffectCtx::new(None, None, None),
            sink: VideoSink::new(dir.path().join("out.avi"), 30.0),
            exporter: CropExporter::new(dir.path().join("objects.zip")),
        }
    }

    #[test]
    fn preview_run_publishes_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(PipelineState::new(
            "test-run".to_string(),
            SourceKind::Image,
            1,
            Arc::new(RwLock::new(EffectConfig::default())),
        ));
        let parts = components(&dir);

        let handle = {
            let state = Arc::clone(&state);
            thread::spawn(move || process_run(state, parts))
        };

        // Wait for at least one published frame
        let mut waited = 0;
        while state.output.latest().is_none() && waited < 200 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        assert!(state.output.latest().is_some());

        state.request_stop();
        handle.join().unwrap().unwrap();

        assert!(state.output.is_finished());
        assert_eq!(state.phase(), RunPhase::Stopped);
        assert!(state.output.stats().frames_processed >= 1);
        // Preview never opened the sink or the archive
        assert!(!dir.path().join("out.avi").exists());
        assert!(!dir.path().join("objects.zip").exists());
    }

    #[test]
    fn chain_failure_spoils_only_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EffectConfig {
            upscale: true,
            ..EffectConfig::default()
        };
        let state = Arc::new(PipelineState::new(
            "broken-upscale".to_string(),
            SourceKind::Image,
            1,
            Arc::new(RwLock::new(cfg)),
        ));
        let mut parts = components(&dir);
        parts.ctx.upscaler = Some(Box::new(BrokenUpscaler));

        let handle = {
            let state = Arc::clone(&state);
            thread::spawn(move || process_run(state, parts))
        };

        // Frames keep flowing despite the failing chain stage
        let mut waited = 0;
        while state.output.stats().frames_processed < 3 && waited < 200 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        assert!(state.output.stats().frames_processed >= 3);
        assert!(state.output.latest().is_some());

        state.request_stop();
        handle.join().unwrap().unwrap();
        assert_eq!(state.phase(), RunPhase::Stopped);
    }
}
