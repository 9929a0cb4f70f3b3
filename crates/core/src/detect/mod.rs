use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the playback source reported for one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub track_id: String,
    /// Artwork URL or content identifier handed to the artwork fetcher.
    pub artwork_ref: String,
    pub is_playing: bool,
    pub captured_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    pub fn new(
        track_id: impl Into<String>,
        artwork_ref: impl Into<String>,
        is_playing: bool,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            artwork_ref: artwork_ref.into(),
            is_playing,
            captured_at: Utc::now(),
        }
    }

    /// The change-relevant part of this snapshot.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            track_id: self.track_id.clone(),
            artwork_ref: self.artwork_ref.clone(),
        }
    }
}

/// The part of a snapshot that decides whether artwork must be re-processed.
/// Play state and capture time are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub track_id: String,
    pub artwork_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Extraction work is required for this snapshot.
    pub changed: bool,
    pub fingerprint: Fingerprint,
}

/// Decides whether `current` needs extraction given the last processed
/// fingerprint. Paused snapshots never do, but their fingerprint is still
/// returned so resuming the same track stays quiet.
pub fn evaluate(previous: Option<&Fingerprint>, current: &PlaybackSnapshot) -> Evaluation {
    let fingerprint = current.fingerprint();
    let changed = current.is_playing && previous != Some(&fingerprint);
    Evaluation {
        changed,
        fingerprint,
    }
}

/// Holds the fingerprint of the last processed snapshot for one polling
/// target.
#[derive(Debug, Default, Clone)]
pub struct ChangeDetector {
    previous: Option<Fingerprint>,
}

impl ChangeDetector {
    /// A detector that has seen nothing yet, so the first playing snapshot
    /// counts as a change.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `snapshot` and records its fingerprint.
    pub fn observe(&mut self, snapshot: &PlaybackSnapshot) -> Evaluation {
        let evaluation = evaluate(self.previous.as_ref(), snapshot);
        self.previous = Some(evaluation.fingerprint.clone());
        evaluation
    }

    /// Fingerprint of the last observed snapshot.
    pub fn previous(&self) -> Option<&Fingerprint> {
        self.previous.as_ref()
    }

    /// Forgets the last fingerprint.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn snapshot(track: &str, art: &str, playing: bool) -> PlaybackSnapshot {
        PlaybackSnapshot::new(track, art, playing)
    }

    #[test]
    fn first_playing_snapshot_is_a_change() {
        let mut detector = ChangeDetector::new();
        assert!(detector.observe(&snapshot("t1", "a1", true)).changed);
        assert_eq!(detector.previous(), Some(&snapshot("t1", "a1", true).fingerprint()));
    }

    #[test]
    fn capture_time_is_not_part_of_the_fingerprint() {
        let mut detector = ChangeDetector::new();
        let first = snapshot("t1", "a1", true);
        let mut later = first.clone();
        later.captured_at = first.captured_at + Duration::seconds(5);

        assert!(detector.observe(&first).changed);
        assert!(!detector.observe(&later).changed);
    }

    #[test]
    fn paused_snapshots_never_trigger_but_still_update() {
        let previous = snapshot("t1", "a1", true).fingerprint();
        let paused = snapshot("t2", "a2", false);

        let evaluation = evaluate(Some(&previous), &paused);
        assert!(!evaluation.changed);
        assert_eq!(evaluation.fingerprint, paused.fingerprint());

        let mut detector = ChangeDetector::new();
        assert!(!detector.observe(&paused).changed);
        // Resuming the same track does not re-trigger.
        assert!(!detector.observe(&snapshot("t2", "a2", true)).changed);
    }

    #[test]
    fn pause_and_resume_of_the_same_track_is_quiet() {
        let mut detector = ChangeDetector::new();
        assert!(detector.observe(&snapshot("t1", "a1", true)).changed);
        assert!(!detector.observe(&snapshot("t1", "a1", false)).changed);
        assert!(!detector.observe(&snapshot("t1", "a1", true)).changed);
    }

    #[test]
    fn either_field_changing_is_a_change() {
        let mut detector = ChangeDetector::new();
        detector.observe(&snapshot("t1", "a1", true));
        assert!(detector.observe(&snapshot("t1", "a2", true)).changed);
        assert!(detector.observe(&snapshot("t2", "a2", true)).changed);
    }

    #[test]
    fn reset_forgets_the_last_fingerprint() {
        let mut detector = ChangeDetector::new();
        detector.observe(&snapshot("t1", "a1", true));
        detector.reset();
        assert!(detector.previous().is_none());
        assert!(detector.observe(&snapshot("t1", "a1", true)).changed);
    }

    #[test]
    fn snapshots_use_camel_case_on_the_wire() {
        let json = r#"{
            "trackId": "4uLU6hMCjMI75M1A2tKUQC",
            "artworkRef": "https://i.scdn.co/image/ab67616d0000b273",
            "isPlaying": true,
            "capturedAt": "2024-05-01T12:00:00Z"
        }"#;
        let parsed: PlaybackSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.track_id, "4uLU6hMCjMI75M1A2tKUQC");
        assert!(parsed.is_playing);
    }
}
