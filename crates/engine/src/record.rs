//! Playback telemetry records.
//!
//! [`PlaybackStatistics`] is what a player reports for one session. It is
//! stored verbatim as compact JSON and mined for the counters in
//! [`crate::ingest`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Media event fired when the browser starts loading.
pub const EVENT_LOAD_START: &str = "loadstart";
/// Media event fired when the first frame is available.
pub const EVENT_LOADED_DATA: &str = "loadeddata";
/// Media event fired when playback starts.
pub const EVENT_PLAYING: &str = "playing";
/// Media event fired when playback reaches the end.
pub const EVENT_ENDED: &str = "ended";

/// One DOM media event, sent on the wire as `[timestamp, type]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, String)", into = "(f64, String)")]
pub struct DomEvent {
    /// Client timestamp of the event.
    pub timestamp: f64,
    /// Event type, e.g. `playing`.
    pub kind: String,
}

impl DomEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(timestamp: f64, kind: impl Into<String>) -> Self {
        Self { timestamp, kind: kind.into() }
    }
}

impl From<(f64, String)> for DomEvent {
    fn from((timestamp, kind): (f64, String)) -> Self {
        Self { timestamp, kind }
    }
}

impl From<DomEvent> for (f64, String) {
    fn from(event: DomEvent) -> Self {
        (event.timestamp, event.kind)
    }
}

/// Video quality samples collected by the player during the session.
///
/// Stored with the raw record; no aggregate reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackQualitySample {
    /// Number of samples taken.
    pub samples: u64,
    /// Timestamp of each sample.
    #[serde(default)]
    pub creation_times: Vec<f64>,
    /// Dropped frame count at each sample.
    #[serde(default)]
    pub dropped_video_frames: Vec<u64>,
    /// Total frame count at each sample.
    #[serde(default)]
    pub total_video_frames: Vec<u64>,
}

/// Telemetry for one playback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatistics {
    /// Session id; the last segment of the record key.
    pub id: String,
    /// Client timestamp of the report.
    pub timestamp: f64,
    /// URL of the played media.
    pub target: String,
    /// Media events in arrival order.
    pub events: Vec<DomEvent>,
    /// Device tag, e.g. `ios`.
    pub device_tag: String,
    /// Reported video duration.
    pub duration: f64,
    /// Optional quality samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbackquality: Option<PlaybackQualitySample>,
}

impl PlaybackStatistics {
    /// Counts occurrences of each event type.
    #[must_use]
    pub fn event_histogram(&self) -> BTreeMap<&str, u64> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Finds the first occurrence of each milestone event.
    #[must_use]
    pub fn milestones(&self) -> Milestones {
        Milestones::from_events(&self.events)
    }
}

/// Timestamps of the first `loadstart`, `loadeddata`, `playing` and `ended`
/// events, by arrival order.
///
/// A milestone that never fired stays `None`; a timestamp of zero is a real
/// observation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Milestones {
    /// First `loadstart`.
    pub load_start: Option<f64>,
    /// First `loadeddata`.
    pub loaded_data: Option<f64>,
    /// First `playing`.
    pub playing: Option<f64>,
    /// First `ended`.
    pub ended: Option<f64>,
}

impl Milestones {
    /// Scans `events` once.
    #[must_use]
    pub fn from_events(events: &[DomEvent]) -> Self {
        let mut found = Self::default();
        for event in events {
            let slot = match event.kind.as_str() {
                EVENT_LOAD_START => &mut found.load_start,
                EVENT_LOADED_DATA => &mut found.loaded_data,
                EVENT_PLAYING => &mut found.playing,
                EVENT_ENDED => &mut found.ended,
                _ => continue,
            };
            slot.get_or_insert(event.timestamp);
        }
        found
    }

    /// Time from load start to data loaded, when both fired.
    #[must_use]
    pub fn playable_latency(&self) -> Option<f64> {
        Some(self.loaded_data? - self.load_start?)
    }

    /// Time from playing to ended, when both fired.
    #[must_use]
    pub fn actual_playback(&self) -> Option<f64> {
        Some(self.ended? - self.playing?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn events(pairs: &[(f64, &str)]) -> Vec<DomEvent> {
        pairs.iter().map(|&(ts, kind)| DomEvent::new(ts, kind)).collect()
    }

    #[test]
    fn test_event_wire_format_is_pair() {
        let event = DomEvent::new(1.5, "playing");
        assert_eq!(serde_json::to_string(&event).unwrap(), r#"[1.5,"playing"]"#);
        let parsed: DomEvent = serde_json::from_str(r#"[0, "loadstart"]"#).unwrap();
        assert_eq!(parsed, DomEvent::new(0.0, "loadstart"));
    }

    #[test]
    fn test_record_parses_browser_payload() {
        let record: PlaybackStatistics = serde_json::from_str(
            r#"{
                "id": "s-1",
                "timestamp": 1700000000.5,
                "target": "https://mybucket.s3.amazonaws.com/videos/short.mp4",
                "events": [[0, "loadstart"], [5, "loadeddata"]],
                "device_tag": "android",
                "duration": 12.5,
                "playbackquality": {
                    "samples": 2,
                    "creationTimes": [1.0, 2.0],
                    "droppedVideoFrames": [0, 1],
                    "totalVideoFrames": [30, 60]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(record.events.len(), 2);
        assert_eq!(record.playbackquality.as_ref().unwrap().total_video_frames, vec![30, 60]);
    }

    #[test]
    fn test_absent_quality_is_not_serialized() {
        let record = PlaybackStatistics {
            id: "s".into(),
            timestamp: 0.0,
            target: "http://h/v".into(),
            events: Vec::new(),
            device_tag: "ios".into(),
            duration: 0.0,
            playbackquality: None,
        };
        assert!(!serde_json::to_string(&record).unwrap().contains("playbackquality"));
    }

    #[test]
    fn test_milestones_use_first_occurrence_by_arrival() {
        let m = Milestones::from_events(&events(&[
            (10.0, "loadstart"),
            (3.0, "loadstart"),
            (12.0, "loadeddata"),
            (20.0, "playing"),
            (25.0, "pause"),
            (30.0, "playing"),
            (90.0, "ended"),
        ]));
        assert_eq!(m.load_start, Some(10.0));
        assert_eq!(m.playing, Some(20.0));
        assert_eq!(m.playable_latency(), Some(2.0));
        assert_eq!(m.actual_playback(), Some(70.0));
    }

    #[test]
    fn test_zero_timestamp_counts_as_observed() {
        let m = Milestones::from_events(&events(&[(0.0, "loadstart"), (5.0, "loadeddata")]));
        assert_eq!(m.playable_latency(), Some(5.0));
    }

    #[test]
    fn test_missing_milestone_skips_metric() {
        let m = Milestones::from_events(&events(&[(1.0, "loadstart"), (2.0, "playing")]));
        assert_eq!(m.playable_latency(), None);
        assert_eq!(m.actual_playback(), None);
    }

    #[test]
    fn test_event_histogram_counts_types() {
        let record = PlaybackStatistics {
            id: "s".into(),
            timestamp: 0.0,
            target: "http://h/v".into(),
            events: events(&[(0.0, "playing"), (1.0, "pause"), (2.0, "playing")]),
            device_tag: "ios".into(),
            duration: 0.0,
            playbackquality: None,
        };
        let histogram = record.event_histogram();
        assert_eq!(histogram.get("playing"), Some(&2));
        assert_eq!(histogram.get("pause"), Some(&1));
        assert_eq!(histogram.len(), 2);
    }
}
