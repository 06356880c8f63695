// Detection layer: collaborator traits for the vision models plus the
// normalized detection records every effect consumes.

pub mod adapter;
pub mod backends;
pub mod styles;

use anyhow::Result;
use opencv::core::{Mat, Rect};
use serde::Serialize;

/// Axis-aligned box in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Clamp to `[0, frame_w) x [0, frame_h)`. Negative origins move to zero
    /// and the width/height shrink accordingly; boxes spilling past the far
    /// edge are truncated, not dropped. Returns `None` only when nothing of
    /// the box remains inside the frame.
    pub fn clamp_to(&self, frame_w: i32, frame_h: i32) -> Option<Rect> {
        let x = self.x.clamp(0, frame_w);
        let y = self.y.clamp(0, frame_h);
        let w = (self.x + self.w).clamp(0, frame_w) - x;
        let h = (self.y + self.h).clamp(0, frame_h) - y;
        if w <= 0 || h <= 0 {
            return None;
        }
        Some(Rect::new(x, y, w, h))
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = ((x2 - x1) as f32) * ((y2 - y1) as f32);
        let area_a = (self.w as f32) * (self.h as f32);
        let area_b = (other.w as f32) * (other.h as f32);
        let union = area_a + area_b - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One normalized detection. Box detections carry no mask; segmenter
/// detections always carry the raw class probability map (small, box-aligned,
/// CV_32F) which effects resize and binarize at their own cutoff.
#[derive(Debug, Clone)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub mask: Option<Mat>,
}

/// Ordered detections for one frame plus the indices that survived
/// thresholding/suppression. Kept indices are never reordered relative to the
/// raw detector output, so index identity stays valid for any later
/// correlation with confidence arrays.
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
    pub kept: Vec<usize>,
}

impl DetectionSet {
    pub fn kept(&self) -> impl Iterator<Item = &Detection> {
        self.kept.iter().map(|&i| &self.detections[i])
    }

    pub fn kept_len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

/// Raw per-anchor output of a box detector: a center-relative normalized box
/// and one score per class.
#[derive(Debug, Clone)]
pub struct RawPrediction {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub scores: Vec<f32>,
}

/// Raw output of an instance segmenter: predicted class, confidence, a
/// normalized corner box and the class's probability map.
#[derive(Debug, Clone)]
pub struct RawInstance {
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub mask: Mat,
}

/// Box-detector collaborator. Calls are synchronous and frame-order
/// preserving; the adapter owns all filtering and suppression.
pub trait BoxDetector: Send {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<RawPrediction>>;
    fn class_names(&self) -> &[String];
}

/// Instance-segmenter collaborator.
pub trait MaskSegmenter: Send {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<RawInstance>>;
    fn class_names(&self) -> &[String];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_truncates_spill() {
        let b = BBox::new(-10, -5, 50, 40);
        let r = b.clamp_to(640, 480).unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (0, 0, 40, 35));

        let b = BBox::new(600, 400, 100, 100);
        let r = b.clamp_to(640, 480).unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (600, 400, 40, 80));
    }

    #[test]
    fn clamp_rejects_fully_outside() {
        assert!(BBox::new(700, 10, 20, 20).clamp_to(640, 480).is_none());
        assert!(BBox::new(10, 10, 0, 20).clamp_to(640, 480).is_none());
    }

    #[test]
    fn iou_disjoint_and_identical() {
        let a = BBox::new(0, 0, 100, 100);
        let b = BBox::new(200, 200, 100, 100);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }
}
