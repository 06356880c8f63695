// Low-level region primitives shared by every effect. All blending is 8-bit
// per channel and every threshold comparison is strict, so values exactly at
// a threshold are excluded.

use anyhow::Result;
use opencv::core::{self, Mat, Point, Rect, Scalar, Size, CV_8UC1, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

/// Deep copy of a frame region.
pub fn extract_region(frame: &Mat, rect: Rect) -> Result<Mat> {
    Ok(Mat::roi(frame, rect)?.try_clone()?)
}

/// `base + weight * overlay`, saturating.
pub fn alpha_blend(base: &Mat, overlay: &Mat, weight: f64) -> Result<Mat> {
    let mut out = Mat::default();
    core::add_weighted(base, 1.0, overlay, weight, 0.0, &mut out, -1)?;
    Ok(out)
}

/// Median of all 8-bit samples in the image.
pub fn median_u8(image: &Mat) -> Result<u8> {
    let owned;
    let bytes = if image.is_continuous() {
        image.data_bytes()?
    } else {
        owned = image.try_clone()?;
        owned.data_bytes()?
    };

    let mut hist = [0usize; 256];
    for &b in bytes {
        hist[b as usize] += 1;
    }

    let half = bytes.len() / 2;
    let mut seen = 0usize;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > half {
            return Ok(value as u8);
        }
    }
    Ok(0)
}

/// Median-adaptive Canny: low/high thresholds at `(1 ∓ sigma) * median`,
/// clamped to [0, 255]. `sigma == 0` collapses both thresholds onto the
/// median.
pub fn edge_detect_auto(image: &Mat, sigma: f64) -> Result<Mat> {
    let v = median_u8(image)? as f64;
    let lower = ((1.0 - sigma) * v).max(0.0);
    let upper = ((1.0 + sigma) * v).min(255.0);
    let mut edges = Mat::default();
    imgproc::canny_def(image, &mut edges, lower, upper)?;
    Ok(edges)
}

/// Promote a single-channel edge map to BGR, keeping only the selected
/// channels. Edge pixels come out as e.g. `(255, 255, 0)` for `(B, G)`.
pub fn edges_to_bgr(edges: &Mat, keep: (bool, bool, bool)) -> Result<Mat> {
    let zero = Mat::new_rows_cols_with_default(
        edges.rows(),
        edges.cols(),
        CV_8UC1,
        Scalar::all(0.0),
    )?;

    let pick = |on: bool| -> Result<Mat> {
        if on {
            Ok(edges.try_clone()?)
        } else {
            Ok(zero.try_clone()?)
        }
    };

    let mut channels = core::Vector::<Mat>::new();
    channels.push(pick(keep.0)?);
    channels.push(pick(keep.1)?);
    channels.push(pick(keep.2)?);

    let mut out = Mat::default();
    core::merge(&channels, &mut out)?;
    Ok(out)
}

/// Filled white ellipse inscribed in the region, as a 3-channel AND mask.
pub fn ellipse_mask(size: Size) -> Result<Mat> {
    let mut mask =
        Mat::new_rows_cols_with_default(size.height, size.width, CV_8UC3, Scalar::all(0.0))?;
    imgproc::ellipse(
        &mut mask,
        Point::new(size.width / 2, size.height / 2),
        Size::new(size.width / 2, size.height / 2),
        0.0,
        0.0,
        360.0,
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    Ok(mask)
}

/// Gaussian blur with the kernel size forced odd; slider values are arbitrary
/// integers. Sigma follows the kernel size.
pub fn gaussian_blur_odd(image: &Mat, k: i32) -> Result<Mat> {
    let k = if k < 1 { 1 } else { k | 1 };
    let mut out = Mat::default();
    imgproc::gaussian_blur_def(image, &mut out, Size::new(k, k), k as f64)?;
    Ok(out)
}

/// 256-entry LUT gamma correction.
pub fn adjust_gamma(image: &Mat, gamma: f64) -> Result<Mat> {
    let inv = 1.0 / gamma;
    let table: Vec<u8> = (0..256)
        .map(|i| (((i as f64 / 255.0).powf(inv)) * 255.0) as u8)
        .collect();
    let lut = Mat::from_slice(&table)?.try_clone()?;
    let mut out = Mat::default();
    core::lut(image, &lut, &mut out)?;
    Ok(out)
}

/// Filled black backing rectangle plus one text row, used by the HUD.
pub fn label_overlay(
    frame: &mut Mat,
    anchor: Point,
    text: &str,
    color: Scalar,
    scale: f64,
) -> Result<()> {
    let backing = Rect::new(
        anchor.x - 5,
        anchor.y - (scale * 28.0) as i32,
        (text.len() as f64 * scale * 20.0) as i32,
        (scale * 36.0) as i32,
    );
    imgproc::rectangle(
        frame,
        backing,
        Scalar::all(0.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        frame,
        text,
        anchor,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        2,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rows: i32, cols: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC1, Scalar::all(value)).unwrap()
    }

    #[test]
    fn median_of_uniform_image() {
        assert_eq!(median_u8(&solid(10, 10, 42.0)).unwrap(), 42);
    }

    #[test]
    fn alpha_blend_weights_overlay_and_saturates() {
        let base = solid(4, 4, 100.0);
        let overlay = solid(4, 4, 50.0);
        let out = alpha_blend(&base, &overlay, 0.2).unwrap();
        assert_eq!(*out.at_2d::<u8>(0, 0).unwrap(), 110);

        let bright = solid(4, 4, 250.0);
        let out = alpha_blend(&base, &bright, 1.0).unwrap();
        assert_eq!(*out.at_2d::<u8>(0, 0).unwrap(), 255);
    }

    #[test]
    fn edges_to_bgr_zeroes_dropped_channels() {
        let mut edges = solid(4, 4, 0.0);
        *edges.at_2d_mut::<u8>(1, 1).unwrap() = 255;
        let bgr = edges_to_bgr(&edges, (true, true, false)).unwrap();
        let px = bgr.at_2d::<core::Vec3b>(1, 1).unwrap();
        assert_eq!((px[0], px[1], px[2]), (255, 255, 0));
    }

    #[test]
    fn blur_kernel_forced_odd() {
        let img = solid(16, 16, 128.0);
        // Even and zero slider values must not panic inside OpenCV
        gaussian_blur_odd(&img, 4).unwrap();
        gaussian_blur_odd(&img, 0).unwrap();
    }

    #[test]
    fn gamma_darkens_midtones() {
        let img = solid(4, 4, 128.0);
        let out = adjust_gamma(&img, 0.3).unwrap();
        let px = *out.at_2d::<u8>(0, 0).unwrap();
        assert!(px < 128);
    }

    #[test]
    fn ellipse_mask_covers_center_not_corner() {
        let mask = ellipse_mask(Size::new(40, 20)).unwrap();
        let center = mask.at_2d::<core::Vec3b>(10, 20).unwrap();
        let corner = mask.at_2d::<core::Vec3b>(0, 0).unwrap();
        assert_eq!(center[0], 255);
        assert_eq!(corner[0], 0);
    }
}
