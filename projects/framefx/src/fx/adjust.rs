// Final color adjustment, applied unconditionally after every other effect:
// contrast/brightness via a linear rescale, then a multiplicative gain on the
// HSV saturation channel.

use anyhow::Result;
use opencv::core::{self, Mat, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::EffectConfig;

pub fn brightness_contrast_saturation(frame: &Mat, cfg: &EffectConfig) -> Result<Mat> {
    let mut rescaled = Mat::default();
    core::convert_scale_abs(
        frame,
        &mut rescaled,
        cfg.contrast as f64 / 100.0,
        cfg.brightness as f64,
    )?;

    let gain = cfg.saturation as f64 / 100.0;
    if (gain - 1.0).abs() < f64::EPSILON {
        return Ok(rescaled);
    }

    let mut hsv = Mat::default();
    imgproc::cvt_color_def(&rescaled, &mut hsv, imgproc::COLOR_BGR2HSV)?;

    let mut channels = core::Vector::<Mat>::new();
    core::split(&hsv, &mut channels)?;
    let mut saturated = Mat::default();
    core::multiply(&channels.get(1)?, &Scalar::all(gain), &mut saturated, 1.0, -1)?;
    channels.set(1, saturated)?;
    core::merge(&channels, &mut hsv)?;

    let mut out = Mat::default();
    imgproc::cvt_color_def(&hsv, &mut out, imgproc::COLOR_HSV2BGR)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};

    fn frame() -> Mat {
        Mat::new_rows_cols_with_default(8, 8, CV_8UC3, Scalar::new(40.0, 80.0, 120.0, 0.0))
            .unwrap()
    }

    #[test]
    fn neutral_settings_are_identity() {
        let cfg = EffectConfig::default();
        let out = brightness_contrast_saturation(&frame(), &cfg).unwrap();
        let px = out.at_2d::<Vec3b>(4, 4).unwrap();
        assert_eq!((px[0], px[1], px[2]), (40, 80, 120));
    }

    #[test]
    fn brightness_shifts_all_channels() {
        let cfg = EffectConfig {
            brightness: 10,
            ..EffectConfig::default()
        };
        let out = brightness_contrast_saturation(&frame(), &cfg).unwrap();
        let px = out.at_2d::<Vec3b>(0, 0).unwrap();
        assert_eq!((px[0], px[1], px[2]), (50, 90, 130));
    }

    #[test]
    fn contrast_saturates_at_255() {
        let cfg = EffectConfig {
            contrast: 400,
            ..EffectConfig::default()
        };
        let out = brightness_contrast_saturation(&frame(), &cfg).unwrap();
        let px = out.at_2d::<Vec3b>(0, 0).unwrap();
        assert_eq!(px[2], 255);
    }

    #[test]
    fn zero_saturation_grays_the_frame() {
        let cfg = EffectConfig {
            saturation: 0,
            ..EffectConfig::default()
        };
        let out = brightness_contrast_saturation(&frame(), &cfg).unwrap();
        let px = out.at_2d::<Vec3b>(4, 4).unwrap();
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}
