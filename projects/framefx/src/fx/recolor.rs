// Segmenter-conditioned recoloring. Five variants sharing one skeleton: an
// adaptive edge map restricted to chosen channels, per-instance binary masks
// resized into the box, and edge pixels remapped to a per-variant color.
// Cutoffs differ per variant and comparisons are strict.

use anyhow::Result;
use opencv::core::{self, Mat, Point, Rect, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::EffectConfig;
use crate::detect::adapter::resize_mask;
use crate::detect::{Detection, DetectionSet};
use crate::fx::compositor::{alpha_blend, edge_detect_auto, edges_to_bgr, gaussian_blur_odd};

const CUTOFF_LOOSE: f64 = 0.1;
const CUTOFF_MID: f64 = 0.2;
const CUTOFF_TIGHT: f64 = 0.5;

/// Effect-level label threshold in `color_canny`, deliberately independent of
/// the detector-level confidence slider.
const LABEL_CONFIDENCE: f32 = 0.5;

fn black_like(frame: &Mat) -> Result<Mat> {
    Ok(Mat::new_rows_cols_with_default(
        frame.rows(),
        frame.cols(),
        CV_8UC3,
        Scalar::all(0.0),
    )?)
}

struct Instance<'a> {
    det: &'a Detection,
    rect: Rect,
    mask: Mat,
}

/// Clamp each kept detection's box and binarize its probability map at the
/// variant's cutoff. Detections without a mask or fully outside the frame are
/// skipped, never fatal.
fn instances<'a>(frame: &Mat, set: &'a DetectionSet, cutoff: f64) -> Result<Vec<Instance<'a>>> {
    let mut out = Vec::new();
    for det in set.kept() {
        let Some(mask) = det.mask.as_ref() else {
            continue;
        };
        let Some(rect) = det.bbox.clamp_to(frame.cols(), frame.rows()) else {
            continue;
        };
        out.push(Instance {
            det,
            rect,
            mask: resize_mask(mask, rect.width, rect.height, cutoff)?,
        });
    }
    Ok(out)
}

/// Edge pixels inside each instance mask, as a full-frame single-channel mask.
fn masked_edges(edges: &Mat, inst: &Instance) -> Result<Mat> {
    let edge_roi = Mat::roi(edges, inst.rect)?;
    let mut combined = Mat::default();
    core::bitwise_and_def(&edge_roi, &inst.mask, &mut combined)?;
    Ok(combined)
}

/// Masked edges on black: blue/green edges of each instance recolored to
/// yellow, everything else discarded.
pub fn cut_background(frame: &Mat, set: &DetectionSet) -> Result<Mat> {
    let edges = edge_detect_auto(frame, 0.33)?;
    let mut out = black_like(frame)?;

    for inst in instances(frame, set, CUTOFF_LOOSE)? {
        let combined = masked_edges(&edges, &inst)?;
        let mut roi = out.roi_mut(inst.rect)?;
        roi.set_to(&Scalar::new(0.0, 255.0, 255.0, 0.0), &combined)?;
    }

    Ok(out)
}

/// Masked edges recolored to cyan and added over a substitute background
/// (the original frame when no background is configured).
pub fn replace_background(
    frame: &Mat,
    set: &DetectionSet,
    background: Option<&Mat>,
) -> Result<Mat> {
    let blurred = gaussian_blur_odd(frame, 5)?;
    let edges = edge_detect_auto(&blurred, 0.33)?;
    let mut fg = black_like(frame)?;

    for inst in instances(frame, set, CUTOFF_LOOSE)? {
        let combined = masked_edges(&edges, &inst)?;
        let mut roi = fg.roi_mut(inst.rect)?;
        roi.set_to(&Scalar::new(255.0, 255.0, 0.0, 0.0), &combined)?;
    }

    let bg = match background {
        Some(b) => {
            let mut resized = Mat::default();
            imgproc::resize(
                b,
                &mut resized,
                Size::new(frame.cols(), frame.rows()),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            resized
        }
        None => frame.try_clone()?,
    };

    alpha_blend(&bg, &fg, 1.0)
}

/// Magenta masked edges over a blurred blue/green edge rendering of the whole
/// frame, with per-class labels re-thresholded at a hardcoded confidence.
pub fn color_canny(frame: &Mat, set: &DetectionSet, cfg: &EffectConfig) -> Result<Mat> {
    let blurred = gaussian_blur_odd(frame, 5)?;
    // Zero sigma collapses both canny thresholds onto the median
    let edges = edge_detect_auto(&blurred, 0.0)?;
    let mut fg = black_like(frame)?;

    for inst in instances(frame, set, CUTOFF_LOOSE)? {
        let combined = masked_edges(&edges, &inst)?;
        let mut roi = fg.roi_mut(inst.rect)?;
        roi.set_to(&Scalar::new(255.0, 0.0, 255.0, 0.0), &combined)?;
    }

    let edge_bg = edges_to_bgr(&edges, (true, true, false))?;
    let mut edge_bg = gaussian_blur_odd(&edge_bg, cfg.blur)?;

    // Label pass runs over all raw detections with its own threshold, not the
    // slider-filtered kept set.
    for det in &set.detections {
        if det.confidence <= LABEL_CONFIDENCE {
            continue;
        }
        if !matches!(det.label.as_str(), "person" | "car" | "truck" | "bus") {
            continue;
        }
        let Some(rect) = det.bbox.clamp_to(frame.cols(), frame.rows()) else {
            continue;
        };
        let color = if det.label == "person" {
            Scalar::new(0.0, 255.0, 255.0, 0.0)
        } else {
            Scalar::new(255.0, 0.0, 255.0, 0.0)
        };
        let scale = ((rect.width * rect.height) as f64).sqrt() / 200.0;
        imgproc::put_text(
            &mut edge_bg,
            &format!("{}[{:.2}]", det.label, det.confidence),
            Point::new(rect.x, rect.y - 50),
            imgproc::FONT_HERSHEY_SIMPLEX,
            scale,
            color,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    let mut out = Mat::default();
    core::bitwise_or_def(&fg, &edge_bg, &mut out)?;
    Ok(out)
}

/// Masked regions blacked out on the original frame, with their edges drawn
/// in yellow for persons and green for everything else. Tight mask cutoff.
pub fn color_canny_on_background(frame: &Mat, set: &DetectionSet) -> Result<Mat> {
    let edges = edge_detect_auto(frame, 0.33)?;
    let mut out = frame.try_clone()?;

    for inst in instances(frame, set, CUTOFF_TIGHT)? {
        let combined = masked_edges(&edges, &inst)?;
        let color = if inst.det.label == "person" {
            Scalar::new(0.0, 255.0, 255.0, 0.0)
        } else {
            Scalar::new(0.0, 255.0, 0.0, 0.0)
        };
        let mut roi = out.roi_mut(inst.rect)?;
        roi.set_to(&Scalar::all(0.0), &inst.mask)?;
        roi.set_to(&color, &combined)?;
    }

    Ok(out)
}

/// Shrink a box symmetrically by `1/divisor` per side, matching the mask
/// resize dimensions. Shrink amounts are forced even so the region stays
/// centered.
pub fn shrink_rect(rect: Rect, divisor: i32) -> Rect {
    let d = if divisor == 0 { 2 } else { divisor };
    let mut sx = rect.width / d;
    let mut sy = rect.height / d;
    if sx % 2 != 0 {
        sx += 1;
    }
    if sy % 2 != 0 {
        sy += 1;
    }
    if rect.width <= sx {
        sx = 0;
    }
    if rect.height <= sy {
        sy = 0;
    }
    Rect::new(
        rect.x + sx / 2,
        rect.y + sy / 2,
        rect.width - sx,
        rect.height - sy,
    )
}

fn color_on_backdrop(
    frame: &Mat,
    set: &DetectionSet,
    backdrop: Mat,
    divisor: i32,
    cutoff: f64,
) -> Result<Mat> {
    let mut out = backdrop;

    for det in set.kept() {
        let Some(mask) = det.mask.as_ref() else {
            continue;
        };
        let Some(rect) = det.bbox.clamp_to(frame.cols(), frame.rows()) else {
            continue;
        };
        let rect = shrink_rect(rect, divisor);
        if rect.width <= 0 || rect.height <= 0 {
            continue;
        }
        let mask = resize_mask(mask, rect.width, rect.height, cutoff)?;

        let src = Mat::roi(frame, rect)?;
        let mut dst = out.roi_mut(rect)?;
        src.copy_to_masked(&mut dst, &mask)?;
    }

    Ok(out)
}

/// Original colors inside shrunk masks on a grayscale background.
pub fn color_on_gray(frame: &Mat, set: &DetectionSet, cfg: &EffectConfig) -> Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    let mut backdrop = Mat::default();
    imgproc::cvt_color_def(&gray, &mut backdrop, imgproc::COLOR_GRAY2BGR)?;
    color_on_backdrop(frame, set, backdrop, cfg.shrink_divisor, CUTOFF_MID)
}

/// Original colors inside shrunk masks on a blurred grayscale background.
pub fn color_on_gray_blur(frame: &Mat, set: &DetectionSet) -> Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    let blurred = gaussian_blur_odd(&gray, 17)?;
    let mut backdrop = Mat::default();
    imgproc::cvt_color_def(&blurred, &mut backdrop, imgproc::COLOR_GRAY2BGR)?;
    color_on_backdrop(frame, set, backdrop, 10, CUTOFF_LOOSE)
}

/// Sharp masked objects on a color-blurred background.
pub fn objects_on_blur(frame: &Mat, set: &DetectionSet, cfg: &EffectConfig) -> Result<Mat> {
    let backdrop = gaussian_blur_odd(frame, cfg.blur)?;
    color_on_backdrop(frame, set, backdrop, cfg.shrink_divisor, CUTOFF_LOOSE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BBox, Detection};
    use opencv::core::{CV_32F, CV_8UC3};

    fn frame() -> Mat {
        Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::new(50.0, 80.0, 120.0, 0.0))
            .unwrap()
    }

    fn masked_person(x: i32, y: i32, w: i32, h: i32, fill: f32) -> Detection {
        let mask =
            Mat::new_rows_cols_with_default(15, 15, CV_32F, Scalar::all(fill as f64)).unwrap();
        Detection {
            class_id: 0,
            label: "person".into(),
            confidence: 0.9,
            bbox: BBox::new(x, y, w, h),
            mask: Some(mask),
        }
    }

    fn set_with(dets: Vec<Detection>) -> DetectionSet {
        let kept = (0..dets.len()).collect();
        DetectionSet {
            detections: dets,
            kept,
        }
    }

    #[test]
    fn cut_background_confines_output_to_boxes() {
        let f = frame();
        let set = set_with(vec![masked_person(20, 20, 30, 30, 0.9)]);
        let out = cut_background(&f, &set).unwrap();
        // Outside every box the canvas is black
        let px = out.at_2d::<core::Vec3b>(90, 90).unwrap();
        assert_eq!((px[0], px[1], px[2]), (0, 0, 0));
    }

    #[test]
    fn color_on_gray_keeps_background_gray() {
        let f = frame();
        let set = set_with(vec![masked_person(10, 10, 20, 20, 0.9)]);
        let cfg = EffectConfig::default();
        let out = color_on_gray(&f, &set, &cfg).unwrap();
        // Far from the box, all channels equal (grayscale)
        let px = out.at_2d::<core::Vec3b>(90, 90).unwrap();
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        // Inside the shrunk mask, the original color survives
        let inner = out.at_2d::<core::Vec3b>(20, 20).unwrap();
        assert_eq!((inner[0], inner[1], inner[2]), (50, 80, 120));
    }

    #[test]
    fn tight_cutoff_excludes_weak_masks() {
        let f = frame();
        // Probability 0.3 passes the loose cutoff but not the tight one
        let set = set_with(vec![masked_person(10, 10, 30, 30, 0.3)]);
        let out = color_canny_on_background(&f, &set).unwrap();
        let px = out.at_2d::<core::Vec3b>(20, 20).unwrap();
        assert_eq!((px[0], px[1], px[2]), (50, 80, 120));
    }

    #[test]
    fn shrink_rect_stays_centered() {
        let r = shrink_rect(Rect::new(10, 10, 40, 20), 10);
        assert_eq!((r.x, r.y, r.width, r.height), (12, 11, 36, 18));
        // Divisor zero falls back to halving
        let r = shrink_rect(Rect::new(0, 0, 40, 40), 0);
        assert_eq!((r.width, r.height), (20, 20));
    }

    #[test]
    fn shrink_never_exceeds_box() {
        let r = shrink_rect(Rect::new(0, 0, 3, 3), 1);
        assert!(r.width > 0 && r.height > 0);
    }
}
