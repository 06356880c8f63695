use super::FrameSource;
use crate::pipeline::state::SourceKind;
use anyhow::{anyhow, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT},
};

pub struct VideoFileSource {
    capture: VideoCapture,
    source_fps: f64,
    total_frames: u64,
}

impl VideoFileSource {
    pub fn open(path: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(path, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("failed to open video file: {}", path));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("no FPS in metadata for {}, falling back to 30.0", path);
            fps = 30.0;
        }
        let total_frames = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;

        tracing::info!(
            "opened {}, duration={:.2}s, fps={:.2}, frames={}",
            path,
            total_frames as f64 / fps,
            fps,
            total_frames
        );

        Ok(Self {
            capture,
            source_fps: fps,
            total_frames,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            // Exhaustion, not an error
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn fps(&self) -> f64 {
        self.source_fps
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }
}
