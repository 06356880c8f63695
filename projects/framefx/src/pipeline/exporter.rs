// Object-crop export side channel: detections extracted during recording are
// JPEG-encoded and appended to a zip archive as `{label}{index}.jpg`.
//
// The archive is a Closed -> Open -> Finished state machine driven by the
// run's lifecycle phase and source kind. A video archive stays open until the
// run ends or is stopped; an image archive closes after its single frame and
// never reopens within the same run.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use opencv::core::Vector;
use opencv::imgcodecs;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::fx::ExtractedCrop;
use crate::pipeline::state::{RunPhase, SourceKind};

enum ExportState {
    Closed,
    Open(ZipWriter<File>),
    Finished,
}

pub struct CropExporter {
    path: PathBuf,
    state: ExportState,
    object_index: u64,
    open_cycles: u32,
}

impl CropExporter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: ExportState::Closed,
            object_index: 0,
            open_cycles: 0,
        }
    }

    /// Number of times the archive has been opened. An image source must
    /// never exceed one cycle per run.
    pub fn open_cycles(&self) -> u32 {
        self.open_cycles
    }

    /// Append this frame's crops. Only runs in the recording phase; the
    /// archive opens lazily with the first exported crop.
    pub fn export(
        &mut self,
        crops: Vec<ExtractedCrop>,
        phase: RunPhase,
        source: SourceKind,
    ) -> Result<()> {
        if phase != RunPhase::Recording || crops.is_empty() {
            return Ok(());
        }

        if matches!(self.state, ExportState::Closed) {
            let file = File::create(&self.path)
                .with_context(|| format!("creating crop archive at {}", self.path.display()))?;
            self.state = ExportState::Open(ZipWriter::new(file));
            self.open_cycles += 1;
            info!(path = %self.path.display(), "crop archive opened");
        }

        let ExportState::Open(writer) = &mut self.state else {
            // Finished: the single image cycle already ran
            return Ok(());
        };

        for crop in crops {
            let mut encoded = Vector::<u8>::new();
            imgcodecs::imencode_def(".jpg", &crop.image, &mut encoded)?;
            let name = format!("{}{}.jpg", crop.label, self.object_index);
            writer.start_file(&name, SimpleFileOptions::default())?;
            writer.write_all(encoded.as_slice())?;
            self.object_index += 1;
            debug!(name, "crop exported");
        }

        // One extraction cycle per run for a still image
        if source == SourceKind::Image {
            self.finish()?;
        }
        Ok(())
    }

    /// Close the archive if open. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if let ExportState::Open(writer) =
            std::mem::replace(&mut self.state, ExportState::Finished)
        {
            writer.finish().context("closing crop archive")?;
            info!(path = %self.path.display(), "crop archive closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Mat, Scalar, CV_8UC3};

    fn crop(label: &str) -> ExtractedCrop {
        ExtractedCrop {
            label: label.to_string(),
            image: Mat::new_rows_cols_with_default(8, 8, CV_8UC3, Scalar::all(100.0)).unwrap(),
        }
    }

    fn archive_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("objects.zip")
    }

    #[test]
    fn preview_phase_exports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CropExporter::new(archive_path(&dir));
        exporter
            .export(vec![crop("person")], RunPhase::Idle, SourceKind::Video)
            .unwrap();
        assert_eq!(exporter.open_cycles(), 0);
        assert!(!archive_path(&dir).exists());
    }

    #[test]
    fn image_source_gets_exactly_one_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CropExporter::new(archive_path(&dir));

        exporter
            .export(vec![crop("person")], RunPhase::Recording, SourceKind::Image)
            .unwrap();
        // Image sources keep yielding the same frame; later exports no-op
        exporter
            .export(vec![crop("person")], RunPhase::Recording, SourceKind::Image)
            .unwrap();
        exporter.finish().unwrap();

        assert_eq!(exporter.open_cycles(), 1);
        let file = File::open(archive_path(&dir)).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn video_source_accumulates_across_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CropExporter::new(archive_path(&dir));

        exporter
            .export(
                vec![crop("person"), crop("car")],
                RunPhase::Recording,
                SourceKind::Video,
            )
            .unwrap();
        exporter
            .export(vec![crop("person")], RunPhase::Recording, SourceKind::Video)
            .unwrap();
        exporter.finish().unwrap();

        assert_eq!(exporter.open_cycles(), 1);
        let file = File::open(archive_path(&dir)).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 3);
        // Object indices are globally increasing across frames
        assert!(archive.by_name("person0.jpg").is_ok());
        assert!(archive.by_name("car1.jpg").is_ok());
        assert!(archive.by_name("person2.jpg").is_ok());
    }

    #[test]
    fn finish_without_open_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = CropExporter::new(archive_path(&dir));
        exporter.finish().unwrap();
        assert!(!archive_path(&dir).exists());
    }
}
