// HUD rendering: one backed text row per detected class, stacked vertically,
// plus a bottom progress bar with percent and FPS.

use anyhow::Result;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use crate::detect::styles::style_for;
use crate::fx::compositor::label_overlay;
use crate::pipeline::stats::FrameStats;

const ROW_SCALE: f64 = 1.4;
const ROW_STEP: i32 = 50;

pub fn draw_hud(frame: &mut Mat, stats: &FrameStats) -> Result<()> {
    let mut y = 45;
    for (label, count) in &stats.per_class_counts {
        // The counts map is keyed by label only; derive a stable palette
        // index from the label bytes
        let pseudo_id: usize = label.bytes().map(usize::from).sum();
        let style = style_for(pseudo_id, label);
        label_overlay(
            frame,
            Point::new(10, y),
            &format!("{label}: {count}"),
            style.color,
            ROW_SCALE,
        )?;
        y += ROW_STEP;
    }

    if stats.total_frames > 0 {
        draw_progress(frame, stats)?;
    }
    Ok(())
}

fn draw_progress(frame: &mut Mat, stats: &FrameStats) -> Result<()> {
    let w = frame.cols();
    let h = frame.rows();
    let track = Rect::new(10, h - 18, w - 20, 8);
    let filled_w = ((w - 20) as f32 * stats.progress_pct / 100.0) as i32;

    imgproc::rectangle(
        frame,
        track,
        Scalar::all(255.0),
        1,
        imgproc::LINE_8,
        0,
    )?;
    if filled_w > 0 {
        imgproc::rectangle(
            frame,
            Rect::new(10, h - 18, filled_w.min(w - 20), 8),
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }
    imgproc::put_text(
        frame,
        &format!("{:.0}% | FPS: {:.2}", stats.progress_pct, stats.fps),
        Point::new(10, h - 26),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        Scalar::all(255.0),
        1,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};
    use std::collections::BTreeMap;

    #[test]
    fn hud_draws_rows_and_bar() {
        let mut frame =
            Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(128.0)).unwrap();
        let mut counts = BTreeMap::new();
        counts.insert("person".to_string(), 3usize);
        let stats = FrameStats {
            frames_processed: 100,
            total_frames: 200,
            progress_pct: 50.0,
            fps: 24.5,
            per_class_counts: counts,
        };
        draw_hud(&mut frame, &stats).unwrap();
        // Row backing rectangle turned the top-left area black
        let px = frame.at_2d::<Vec3b>(30, 20).unwrap();
        assert_eq!((px[0], px[1], px[2]), (0, 0, 0));
        // Half-filled bar is green at the left end of the track
        let bar = frame.at_2d::<Vec3b>(240 - 14, 40).unwrap();
        assert_eq!((bar[0], bar[1], bar[2]), (0, 255, 0));
    }

    #[test]
    fn empty_stats_draw_nothing_without_total() {
        let mut frame =
            Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(128.0)).unwrap();
        let stats = FrameStats::default();
        draw_hud(&mut frame, &stats).unwrap();
        let px = frame.at_2d::<Vec3b>(120, 160).unwrap();
        assert_eq!((px[0], px[1], px[2]), (128, 128, 128));
    }
}
