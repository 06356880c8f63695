use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::pipeline::state::SourceKind;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunMetadata {
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
    #[serde(skip)]
    pub output_dir: PathBuf,
}

impl RunMetadata {
    pub fn output_video_path(&self) -> PathBuf {
        self.output_dir.join("output.avi")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join("objects.zip")
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct SourceEntry {
    pub name: String,
    pub kind: SourceKind,
}

/// Classify a media path by extension.
pub fn source_kind_of(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Image)
    } else {
        None
    }
}

/// All playable sources under the media root, relative names.
pub fn list_sources(media_root: &Path) -> Vec<SourceEntry> {
    WalkDir::new(media_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let kind = source_kind_of(e.path())?;
            let name = e
                .path()
                .strip_prefix(media_root)
                .unwrap_or(e.path())
                .to_string_lossy()
                .into_owned();
            Some(SourceEntry { name, kind })
        })
        .collect()
}

/// Create the output directory for a new run and persist its metadata.
pub fn create_run(output_root: &Path, source_name: &str) -> Result<RunMetadata> {
    let run_id = Utc::now().format("%Y%m%d-%H%M%S%.3f").to_string();
    let output_dir = output_root.join(&run_id);
    fs::create_dir_all(&output_dir)?;

    let metadata = RunMetadata {
        source_name: source_name.to_string(),
        created_at: Utc::now(),
        run_id,
        output_dir: output_dir.clone(),
    };

    let content = serde_json::to_string_pretty(&metadata)?;
    fs::write(output_dir.join("metadata.json"), content)?;

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_extensions() {
        assert_eq!(
            source_kind_of(Path::new("clip.MP4")),
            Some(SourceKind::Video)
        );
        assert_eq!(
            source_kind_of(Path::new("shot.jpeg")),
            Some(SourceKind::Image)
        );
        assert_eq!(source_kind_of(Path::new("notes.txt")), None);
        assert_eq!(source_kind_of(Path::new("noext")), None);
    }

    #[test]
    fn lists_sources_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        fs::write(dir.path().join("sub/b.png"), b"x").unwrap();
        fs::write(dir.path().join("skip.txt"), b"x").unwrap();

        let mut names: Vec<_> = list_sources(dir.path())
            .into_iter()
            .map(|s| s.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.mp4", "sub/b.png"]);
    }

    #[test]
    fn create_run_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let meta = create_run(dir.path(), "a.mp4").unwrap();
        assert!(meta.output_dir.join("metadata.json").exists());
        assert_eq!(meta.source_name, "a.mp4");
        assert!(meta.output_video_path().ends_with("output.avi"));
    }
}
