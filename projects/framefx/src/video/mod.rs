// Frame I/O: decoded-frame sources and the incremental video sink. The
// effect core only ever sees `Mat`s; container handling stays here.

pub mod opencv_reader;
pub mod writer;

use anyhow::{anyhow, Result};
use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;
use std::path::Path;

use crate::pipeline::state::SourceKind;

pub use opencv_reader::VideoFileSource;
pub use writer::VideoSink;

/// Decoded-frame source. `next_frame` returning `Ok(None)` means the input is
/// exhausted, which is normal termination for the processing loop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Mat>>;
    fn total_frames(&self) -> u64;
    fn fps(&self) -> f64;
    fn kind(&self) -> SourceKind;
}

/// Still-image source: yields the same decoded frame on every call, so a
/// preview keeps streaming while sliders move. It never exhausts; stopping is
/// the only way out, and the exporter's single-cycle guard keeps the archive
/// from re-extracting the same frame.
pub struct ImageSource {
    image: Mat,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let image = imgcodecs::imread_def(
            path.to_str()
                .ok_or_else(|| anyhow!("non-utf8 image path: {}", path.display()))?,
        )?;
        if image.empty() {
            return Err(anyhow!("failed to decode image: {}", path.display()));
        }
        Ok(Self { image })
    }

    #[cfg(test)]
    pub fn from_mat(image: Mat) -> Self {
        Self { image }
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        Ok(Some(self.image.try_clone()?))
    }

    fn total_frames(&self) -> u64 {
        1
    }

    fn fps(&self) -> f64 {
        30.0
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn image_source_repeats_forever() {
        let mat = Mat::new_rows_cols_with_default(10, 10, CV_8UC3, Scalar::all(5.0)).unwrap();
        let mut src = ImageSource::from_mat(mat);
        assert_eq!(src.total_frames(), 1);
        assert_eq!(src.kind(), SourceKind::Image);
        for _ in 0..3 {
            assert!(src.next_frame().unwrap().is_some());
        }
    }
}
