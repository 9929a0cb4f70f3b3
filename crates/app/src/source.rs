use std::{
    fs, io,
    path::{Path, PathBuf},
};

use palette_sync_core::{PaletteError, PlaybackSnapshot, PlaybackSource, Result};

/// Reads the snapshot an external poller keeps on disk as JSON.
///
/// A missing or empty file means nothing is playing.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlaybackSource for FileSnapshotSource {
    fn poll(&mut self) -> Result<Option<PlaybackSnapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(PaletteError::Source(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| PaletteError::Source(format!("{}: {err}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_files_mean_nothing_playing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.json");
        let mut source = FileSnapshotSource::new(&path);
        assert_eq!(source.path(), path.as_path());
        assert!(source.poll().unwrap().is_none());

        fs::write(&path, "  \n").unwrap();
        assert!(source.poll().unwrap().is_none());
    }

    #[test]
    fn reads_snapshots_written_by_the_poller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.json");
        fs::write(
            &path,
            r#"{"trackId":"t1","artworkRef":"cover.png","isPlaying":false,"capturedAt":"2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();

        let snapshot = FileSnapshotSource::new(&path).poll().unwrap().unwrap();
        assert_eq!(snapshot.track_id, "t1");
        assert_eq!(snapshot.artwork_ref, "cover.png");
        assert!(!snapshot.is_playing);
    }

    #[test]
    fn malformed_snapshots_are_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.json");
        fs::write(&path, r#"{"trackId": 7}"#).unwrap();

        let err = FileSnapshotSource::new(&path).poll().unwrap_err();
        assert!(matches!(err, PaletteError::Source(_)));
    }
}
