// Upscaler and frame-interpolator collaborator seams. The shipped
// implementations are classical: cubic resize in place of the
// super-resolution network, and an equal-weight blend in place of the
// depth-aware interpolator. Both run on the CPU with no model files.

use anyhow::Result;
use opencv::core::{self, Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

pub trait Upscaler: Send {
    fn upscale(&mut self, frame: &Mat) -> Result<Mat>;
}

pub trait FrameInterpolator: Send {
    fn interpolate(&mut self, prev: &Mat, next: &Mat) -> Result<Mat>;
}

pub struct CubicUpscaler {
    pub factor: f64,
}

impl Upscaler for CubicUpscaler {
    fn upscale(&mut self, frame: &Mat) -> Result<Mat> {
        let mut out = Mat::default();
        imgproc::resize(
            frame,
            &mut out,
            Size::new(0, 0),
            self.factor,
            self.factor,
            imgproc::INTER_CUBIC,
        )?;
        Ok(out)
    }
}

pub struct BlendInterpolator;

impl FrameInterpolator for BlendInterpolator {
    fn interpolate(&mut self, prev: &Mat, next: &Mat) -> Result<Mat> {
        let mut out = Mat::default();
        core::add_weighted(prev, 0.5, next, 0.5, 0.0, &mut out, -1)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    #[test]
    fn cubic_upscaler_scales_dimensions() {
        let frame =
            Mat::new_rows_cols_with_default(10, 20, CV_8UC3, Scalar::all(100.0)).unwrap();
        let mut up = CubicUpscaler { factor: 4.0 };
        let out = up.upscale(&frame).unwrap();
        assert_eq!(out.size().unwrap(), Size::new(80, 40));
    }

    #[test]
    fn blend_interpolator_averages() {
        let a = Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(100.0)).unwrap();
        let b = Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(200.0)).unwrap();
        let mid = BlendInterpolator.interpolate(&a, &b).unwrap();
        let px = mid.at_2d::<Vec3b>(0, 0).unwrap();
        assert_eq!(px[0], 150);
    }
}
