// Incremental output sink. The writer opens lazily with the first composed
// frame, since effects like upscaling change the frame size relative to the
// source. An open failure is fatal for the run.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoWriter};
use tracing::info;

pub struct VideoSink {
    path: PathBuf,
    fps: f64,
    writer: Option<VideoWriter>,
}

impl VideoSink {
    pub fn new(path: PathBuf, fps: f64) -> Self {
        Self {
            path,
            fps,
            writer: None,
        }
    }

    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        if self.writer.is_none() {
            let path = self
                .path
                .to_str()
                .ok_or_else(|| anyhow!("non-utf8 output path: {}", self.path.display()))?;
            let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')?;
            let writer =
                VideoWriter::new(path, fourcc, self.fps, frame.size()?, true).with_context(
                    || format!("opening output video at {}", self.path.display()),
                )?;
            if !writer.is_opened()? {
                return Err(anyhow!(
                    "video writer refused to open at {}",
                    self.path.display()
                ));
            }
            info!(path = %self.path.display(), fps = self.fps, "output video opened");
            self.writer = Some(writer);
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write(frame)?;
        }
        Ok(())
    }

    /// Flush and close. Idempotent; a sink that never saw a frame leaves no
    /// file behind.
    pub fn release(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
            info!(path = %self.path.display(), "output video closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
