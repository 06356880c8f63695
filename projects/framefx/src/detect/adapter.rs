// Detection adapter: turns raw model output into a DetectionSet.
//
// The box path does argmax scoring, strict confidence filtering, pixel-space
// conversion and greedy NMS. The mask path does confidence filtering and
// carries the probability map through for per-effect resizing.

use crate::detect::{BBox, BoxDetector, Detection, DetectionSet, MaskSegmenter};
use anyhow::Result;
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

/// IoU above which the lower-confidence of an overlapping pair is suppressed.
pub const NMS_IOU_THRESHOLD: f32 = 0.2;
/// Score floor applied inside suppression, independent of the detector-level
/// confidence slider.
pub const NMS_SCORE_THRESHOLD: f32 = 0.5;

/// Run a box detector and normalize its output.
///
/// Center-relative normalized coordinates are converted to absolute pixel
/// `(x, y, w, h)` against the frame dimensions. Comparisons are strict: a
/// detection exactly at `confidence_threshold` is excluded.
pub fn detect_boxes(
    frame: &Mat,
    detector: &mut dyn BoxDetector,
    confidence_threshold: f32,
) -> Result<DetectionSet> {
    let size = frame.size()?;
    let (width, height) = (size.width as f32, size.height as f32);
    let names = detector.class_names().to_vec();

    let mut detections = Vec::new();
    for pred in detector.detect(frame)? {
        let Some((class_id, confidence)) = argmax(&pred.scores) else {
            continue;
        };
        if confidence <= confidence_threshold {
            continue;
        }

        let w = (pred.w * width) as i32;
        let h = (pred.h * height) as i32;
        let x = (pred.cx * width) as i32 - w / 2;
        let y = (pred.cy * height) as i32 - h / 2;

        detections.push(Detection {
            class_id,
            label: names.get(class_id).cloned().unwrap_or_default(),
            confidence,
            bbox: BBox::new(x, y, w, h),
            mask: None,
        });
    }

    let kept = nms(&detections, NMS_IOU_THRESHOLD, NMS_SCORE_THRESHOLD);
    Ok(DetectionSet { detections, kept })
}

/// Run a segmenter and normalize its output. No suppression is applied: the
/// segmenter already emits one instance per object, so every detection above
/// the threshold is kept.
pub fn detect_masks(
    frame: &Mat,
    segmenter: &mut dyn MaskSegmenter,
    confidence_threshold: f32,
) -> Result<DetectionSet> {
    let size = frame.size()?;
    let (width, height) = (size.width as f32, size.height as f32);
    let names = segmenter.class_names().to_vec();

    let mut detections = Vec::new();
    for inst in segmenter.detect(frame)? {
        if inst.confidence <= confidence_threshold {
            continue;
        }

        let x = (inst.x1 * width) as i32;
        let y = (inst.y1 * height) as i32;
        let w = (inst.x2 * width) as i32 - x;
        let h = (inst.y2 * height) as i32 - y;

        detections.push(Detection {
            class_id: inst.class_id,
            label: names.get(inst.class_id).cloned().unwrap_or_default(),
            confidence: inst.confidence,
            bbox: BBox::new(x, y, w, h),
            mask: Some(inst.mask),
        });
    }

    let kept = (0..detections.len()).collect();
    Ok(DetectionSet { detections, kept })
}

/// Greedy non-maximum suppression.
///
/// Candidates with `confidence > score_threshold` are visited in descending
/// confidence order (earlier raw index wins ties); each survivor suppresses
/// every remaining candidate overlapping it with `IoU > iou_threshold`.
/// Returned indices are ascending, preserving raw detector order.
pub fn nms(detections: &[Detection], iou_threshold: f32, score_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len())
        .filter(|&i| detections[i].confidence > score_threshold)
        .collect();
    // Stable sort keeps the earlier index first on equal confidence.
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .partial_cmp(&detections[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut suppressed = vec![false; detections.len()];
    let mut kept = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        kept.push(i);

        for &j in &order[pos + 1..] {
            if suppressed[j] {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    kept.sort_unstable();
    kept
}

/// Resize a probability map to box pixel dimensions with cubic interpolation,
/// then binarize it at `cutoff` (strict `>`) into an 8-bit 0/255 mask.
pub fn resize_mask(mask: &Mat, width: i32, height: i32, cutoff: f64) -> Result<Mat> {
    let mut resized = Mat::default();
    imgproc::resize(
        mask,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_CUBIC,
    )?;

    let mut binary = Mat::default();
    imgproc::threshold(&resized, &mut binary, cutoff, 255.0, imgproc::THRESH_BINARY)?;

    let mut out = Mat::default();
    binary.convert_to(&mut out, opencv::core::CV_8U, 1.0, 0.0)?;
    Ok(out)
}

fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best
}
