// Per-frame statistics: class counts rebuilt from scratch every frame,
// progress percentage and instantaneous FPS.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::detect::DetectionSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameStats {
    pub frames_processed: u64,
    pub total_frames: u64,
    pub progress_pct: f32,
    pub fps: f32,
    pub per_class_counts: BTreeMap<String, usize>,
}

/// Progress in percent, clamped to [0, 100]. An unknown total reports zero.
pub fn progress_pct(frames_processed: u64, total_frames: u64) -> f32 {
    if total_frames == 0 {
        return 0.0;
    }
    let pct = frames_processed as f32 / total_frames as f32 * 100.0;
    pct.clamp(0.0, 100.0)
}

/// Count kept detections per class label across the given sets, skipping
/// empty labels.
pub fn count_classes(sets: &[&DetectionSet]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for set in sets {
        for det in set.kept() {
            if det.label.is_empty() {
                continue;
            }
            *counts.entry(det.label.clone()).or_insert(0usize) += 1;
        }
    }
    counts
}

/// Tracks per-frame timing and produces the stats record published alongside
/// each frame.
pub struct StatsTracker {
    total_frames: u64,
    frames_processed: u64,
    last_frame_at: Option<Instant>,
    fps: f32,
}

impl StatsTracker {
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            frames_processed: 0,
            last_frame_at: None,
            fps: 0.0,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Record one processed frame and snapshot the stats for it.
    pub fn record(&mut self, boxes: &DetectionSet, masks: &DetectionSet) -> FrameStats {
        let now = Instant::now();
        if let Some(prev) = self.last_frame_at {
            let elapsed = now.duration_since(prev).as_secs_f32();
            if elapsed > 0.0 {
                self.fps = 1.0 / elapsed;
            }
        }
        self.last_frame_at = Some(now);
        self.frames_processed += 1;

        FrameStats {
            frames_processed: self.frames_processed,
            total_frames: self.total_frames,
            progress_pct: progress_pct(self.frames_processed, self.total_frames),
            fps: self.fps,
            per_class_counts: count_classes(&[boxes, masks]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BBox, Detection};

    fn det(label: &str) -> Detection {
        Detection {
            class_id: 0,
            label: label.to_string(),
            confidence: 0.9,
            bbox: BBox::new(0, 0, 10, 10),
            mask: None,
        }
    }

    fn set_of(labels: &[&str]) -> DetectionSet {
        let detections: Vec<_> = labels.iter().map(|l| det(l)).collect();
        let kept = (0..detections.len()).collect();
        DetectionSet { detections, kept }
    }

    #[test]
    fn halfway_progress() {
        let pct = progress_pct(4496, 8991);
        assert!((pct - 50.0).abs() < 0.1);
    }

    #[test]
    fn progress_clamps_past_total() {
        assert_eq!(progress_pct(20, 10), 100.0);
        assert_eq!(progress_pct(5, 0), 0.0);
    }

    #[test]
    fn counts_sum_to_kept_detections() {
        let boxes = set_of(&["person", "person", "car"]);
        let masks = set_of(&["person"]);
        let counts = count_classes(&[&boxes, &masks]);
        assert_eq!(counts["person"], 3);
        assert_eq!(counts["car"], 1);
        let total: usize = counts.values().sum();
        assert_eq!(total, boxes.kept_len() + masks.kept_len());
    }

    #[test]
    fn suppressed_detections_are_not_counted() {
        let mut set = set_of(&["person", "car"]);
        set.kept = vec![1];
        let counts = count_classes(&[&set]);
        assert!(!counts.contains_key("person"));
        assert_eq!(counts["car"], 1);
    }

    #[test]
    fn tracker_is_monotonic() {
        let mut tracker = StatsTracker::new(100);
        let empty = DetectionSet::default();
        let a = tracker.record(&empty, &empty);
        let b = tracker.record(&empty, &empty);
        assert_eq!(a.frames_processed, 1);
        assert_eq!(b.frames_processed, 2);
        assert!(b.progress_pct >= a.progress_pct);
    }
}
