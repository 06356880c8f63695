// Box-detector effects: labeled boxes with translucent fills, ASCII glyph
// rendering inside boxes, and canny silhouettes composited onto black or onto
// the original frame.

use anyhow::Result;
use opencv::core::{self, Mat, Point, Rect, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use rand::Rng;

use crate::config::EffectConfig;
use crate::detect::styles::style_for;
use crate::detect::DetectionSet;
use crate::fx::compositor::{
    adjust_gamma, alpha_blend, edge_detect_auto, ellipse_mask, extract_region,
    gaussian_blur_odd,
};
use crate::fx::{EffectCtx, ExtractedCrop};

const GLYPHS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn black_like(frame: &Mat) -> Result<Mat> {
    Ok(Mat::new_rows_cols_with_default(
        frame.rows(),
        frame.cols(),
        CV_8UC3,
        Scalar::all(0.0),
    )?)
}

fn clamped(frame: &Mat, set: &DetectionSet) -> Vec<(usize, Rect)> {
    set.kept
        .iter()
        .filter_map(|&i| {
            set.detections[i]
                .bbox
                .clamp_to(frame.cols(), frame.rows())
                .map(|r| (i, r))
        })
        .collect()
}

/// White rectangle, `label[conf]` text and a translucent class-color fill per
/// kept detection. Pre-annotation crops are stashed for the export channel.
pub fn extract_objects(
    frame: &Mat,
    set: &DetectionSet,
    ctx: &mut EffectCtx,
) -> Result<Mat> {
    let original = frame.try_clone()?;
    let mut out = frame.try_clone()?;

    for (i, rect) in clamped(frame, set) {
        let det = &set.detections[i];
        let style = style_for(det.class_id, &det.label);

        ctx.extracted.push(ExtractedCrop {
            label: det.label.clone(),
            image: extract_region(&original, rect)?,
        });

        imgproc::rectangle(
            &mut out,
            rect,
            Scalar::all(255.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::put_text(
            &mut out,
            &format!("{}[{:.2}]", det.label, det.confidence),
            Point::new(rect.x, rect.y - 5),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.7,
            style.color,
            2,
            imgproc::LINE_AA,
            false,
        )?;

        let mut fill = black_like(frame)?;
        imgproc::rectangle(&mut fill, rect, style.fill, imgproc::FILLED, imgproc::LINE_8, 0)?;
        out = alpha_blend(&out, &fill, 0.2)?;
    }

    Ok(out)
}

/// Blur each kept box and stamp random glyphs colored by the pixel under each
/// grid point, then write the crop back.
pub fn ascii_objects(
    frame: &Mat,
    set: &DetectionSet,
    cfg: &EffectConfig,
    ctx: &mut EffectCtx,
) -> Result<Mat> {
    let mut out = frame.try_clone()?;
    let font_scale = cfg.ascii_size as f64 / 10.0;
    let step = cfg.ascii_interval.max(1);

    for (_, rect) in clamped(frame, set) {
        let mut crop = gaussian_blur_odd(&extract_region(&out, rect)?, cfg.blur)?;

        for xx in (0..rect.width).step_by(step as usize) {
            for yy in (0..rect.height).step_by(step as usize) {
                let px = *crop.at_2d::<core::Vec3b>(yy, xx)?;
                let glyph = GLYPHS[ctx.rng.gen_range(0..GLYPHS.len())] as char;
                imgproc::put_text(
                    &mut crop,
                    &glyph.to_string(),
                    Point::new(xx, yy),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    font_scale,
                    Scalar::new(px[0] as f64, px[1] as f64, px[2] as f64, 0.0),
                    cfg.ascii_thickness.max(1),
                    imgproc::LINE_8,
                    false,
                )?;
            }
        }

        let mut roi = out.roi_mut(rect)?;
        crop.copy_to(&mut roi)?;
    }

    Ok(out)
}

fn silhouette_crop(frame: &Mat, rect: Rect) -> Result<Mat> {
    let crop = gaussian_blur_odd(&extract_region(frame, rect)?, 5)?;
    let edges = edge_detect_auto(&crop, 0.33)?;
    let mut edges_bgr = Mat::default();
    imgproc::cvt_color_def(&edges, &mut edges_bgr, imgproc::COLOR_GRAY2BGR)?;

    let mask = ellipse_mask(Size::new(rect.width, rect.height))?;
    let mut masked = Mat::default();
    core::bitwise_and_def(&edges_bgr, &mask, &mut masked)?;
    Ok(masked)
}

fn marker_circle(frame: &mut Mat, rect: Rect, color: Scalar) -> Result<()> {
    let thickness = ((rect.width * rect.height) / 7000).max(1);
    imgproc::circle(
        frame,
        Point::new(rect.x + rect.width / 2, rect.y - rect.height / 5),
        2,
        color,
        thickness,
        imgproc::LINE_8,
        0,
    )?;
    Ok(())
}

/// Canny silhouettes of kept boxes, ellipse-masked and gamma-darkened, on a
/// black canvas. Each object gets a marker circle scaled by box area.
pub fn silhouette_black(frame: &Mat, set: &DetectionSet) -> Result<Mat> {
    let mut canvas = black_like(frame)?;

    for (_, rect) in clamped(frame, set) {
        let masked = adjust_gamma(&silhouette_crop(frame, rect)?, 0.3)?;

        let mut overlay = black_like(frame)?;
        let mut roi = overlay.roi_mut(rect)?;
        masked.copy_to(&mut roi)?;
        drop(roi);

        imgproc::ellipse(
            &mut canvas,
            Point::new(rect.x + rect.width / 2, rect.y + rect.height / 2),
            Size::new(rect.width / 2, rect.height / 2),
            0.0,
            0.0,
            360.0,
            Scalar::all(0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        canvas = alpha_blend(&canvas, &overlay, 1.0)?;

        marker_circle(&mut canvas, rect, Scalar::new(0.0, 0.0, 255.0, 0.0))?;
    }

    Ok(canvas)
}

/// Same silhouettes composited over the original frame. Small objects are
/// dimmed in proportion to box area.
pub fn silhouette_inlay(frame: &Mat, set: &DetectionSet) -> Result<Mat> {
    let mut out = frame.try_clone()?;

    for (i, rect) in clamped(frame, set) {
        let det = &set.detections[i];
        let mut masked = silhouette_crop(frame, rect)?;

        let mult = (rect.width * rect.height) as f64 / 20000.0;
        if mult < 1.0 {
            let mut dimmed = Mat::default();
            imgproc::threshold(&masked, &mut dimmed, 0.0, 255.0 * mult, imgproc::THRESH_BINARY)?;
            masked = dimmed;
        }

        let mut overlay = black_like(frame)?;
        let mut roi = overlay.roi_mut(rect)?;
        masked.copy_to(&mut roi)?;
        drop(roi);

        out = alpha_blend(&out, &overlay, 1.0)?;

        let marker = if det.label == "person" {
            Scalar::new(0.0, 0.0, 255.0, 0.0)
        } else {
            Scalar::new(0.0, 255.0, 0.0, 0.0)
        };
        marker_circle(&mut out, rect, marker)?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BBox, Detection};
    use rand::SeedableRng;

    fn frame() -> Mat {
        Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(90.0)).unwrap()
    }

    fn set_with(dets: Vec<Detection>) -> DetectionSet {
        let kept = (0..dets.len()).collect();
        DetectionSet {
            detections: dets,
            kept,
        }
    }

    fn person(x: i32, y: i32, w: i32, h: i32) -> Detection {
        Detection {
            class_id: 0,
            label: "person".into(),
            confidence: 0.9,
            bbox: BBox::new(x, y, w, h),
            mask: None,
        }
    }

    fn ctx() -> EffectCtx {
        EffectCtx {
            background: None,
            extracted: Vec::new(),
            rng: rand::rngs::StdRng::seed_from_u64(7),
            upscaler: None,
            colorizer: None,
        }
    }

    #[test]
    fn extract_objects_stashes_crops() {
        let f = frame();
        let set = set_with(vec![person(10, 20, 40, 50)]);
        let mut ctx = ctx();
        extract_objects(&f, &set, &mut ctx).unwrap();
        assert_eq!(ctx.extracted.len(), 1);
        assert_eq!(ctx.extracted[0].label, "person");
        assert_eq!(ctx.extracted[0].image.size().unwrap(), Size::new(40, 50));
    }

    #[test]
    fn extract_objects_skips_degenerate_boxes() {
        let f = frame();
        let set = set_with(vec![person(500, 500, 20, 20)]);
        let mut ctx = ctx();
        let out = extract_objects(&f, &set, &mut ctx).unwrap();
        assert!(ctx.extracted.is_empty());
        // Frame unchanged
        let diff = {
            let mut d = Mat::default();
            core::absdiff(&f, &out, &mut d).unwrap();
            core::count_non_zero(&d.reshape(1, 0).unwrap().try_clone().unwrap()).unwrap()
        };
        assert_eq!(diff, 0);
    }

    #[test]
    fn silhouette_black_leaves_outside_black() {
        let f = frame();
        let set = set_with(vec![person(40, 30, 40, 40)]);
        let out = silhouette_black(&f, &set).unwrap();
        // Pixels far from the box stay black
        let px = out.at_2d::<core::Vec3b>(110, 150).unwrap();
        assert_eq!((px[0], px[1], px[2]), (0, 0, 0));
    }

    #[test]
    fn ascii_objects_touches_only_boxes() {
        let f = frame();
        let set = set_with(vec![person(10, 10, 30, 30)]);
        let mut ctx = ctx();
        let cfg = EffectConfig::default();
        let out = ascii_objects(&f, &set, &cfg, &mut ctx).unwrap();
        let before = f.at_2d::<core::Vec3b>(100, 100).unwrap();
        let after = out.at_2d::<core::Vec3b>(100, 100).unwrap();
        assert_eq!(before, after);
    }
}
