//! Hierarchical key namespace.
//!
//! Every playback session is addressed by a four-segment [`RecordKey`]:
//!
//! ```text
//! origin : device : video : id
//!   S3   :  ios   : a.mp4 : 8f2c...
//! ```
//!
//! Aggregates live under a truncated ("leveled") form of that key, prefixed
//! by a [`MetricFamily`]. Together these strings are the persisted layout:
//!
//! | Family | Stored key |
//! |--------|------------|
//! | [`OriginalEvent`](MetricFamily::OriginalEvent) | `ORGE:` + full key |
//! | [`EventHistogram`](MetricFamily::EventHistogram) | `AGGRHIST:` + event + `:` + leveled key |
//! | [`PlayableCount`](MetricFamily::PlayableCount) | `AGGRTPLAYABLE_C:` + leveled key |
//! | [`PlayableSum`](MetricFamily::PlayableSum) | `AGGRTPLAYABLE_S:` + leveled key |
//! | [`DurationVideoSum`](MetricFamily::DurationVideoSum) | `AGGRADURATION_VS:` + leveled key |
//! | [`DurationActualSum`](MetricFamily::DurationActualSum) | `AGGRADURATION_AS:` + leveled key |
//!
//! Changing any prefix orphans every previously stored value.

use std::{fmt, str::FromStr};

use crate::error::{EngineError, Result};

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// Number of segments in a full record key.
pub const RECORD_KEY_DEPTH: usize = 4;

/// Depth at which counters are accumulated (origin, device, video).
pub const AGGREGATION_DEPTH: usize = 3;

/// Canonical `origin:device:video:id` key of one playback session.
///
/// Segment boundaries are computed once at construction, so truncating to a
/// depth never rescans the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    canonical: String,
    /// End offset of each segment within `canonical`.
    ends: [usize; RECORD_KEY_DEPTH],
}

impl RecordKey {
    /// Joins the four segments with [`KEY_SEPARATOR`].
    ///
    /// Segments are taken verbatim. A segment containing the separator makes
    /// the stored key ambiguous to readers that split on it, so callers
    /// sanitize before composing.
    #[must_use]
    pub fn compose(origin: &str, device: &str, video: &str, id: &str) -> Self {
        let segments = [origin, device, video, id];
        let mut canonical = String::with_capacity(segments.iter().map(|s| s.len() + 1).sum());
        let mut ends = [0; RECORD_KEY_DEPTH];
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                canonical.push(KEY_SEPARATOR);
            }
            canonical.push_str(segment);
            ends[i] = canonical.len();
        }
        Self { canonical, ends }
    }

    /// Returns the prefix covering the first `depth` segments.
    ///
    /// Depth 4 is the whole key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDepth`] unless `depth` is in `1..=4`.
    pub fn leveled(&self, depth: usize) -> Result<&str> {
        if !(1..=RECORD_KEY_DEPTH).contains(&depth) {
            return Err(EngineError::InvalidDepth { depth });
        }
        Ok(&self.canonical[..self.ends[depth - 1]])
    }

    /// Returns the full canonical key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Returns the four segments in order.
    #[must_use]
    pub fn segments(&self) -> [&str; RECORD_KEY_DEPTH] {
        let mut start = 0;
        self.ends.map(|end| {
            let segment = &self.canonical[start..end];
            start = end + KEY_SEPARATOR.len_utf8();
            segment
        })
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Projects a leveled key onto the segments listed in `nodes`.
///
/// The selected segments are joined with [`KEY_SEPARATOR`] in the order the
/// indices are given, so `[1, 0]` on `S3:ios:a.mp4` yields `ios:S3`.
///
/// # Errors
///
/// Returns [`EngineError::IndexOutOfRange`] if an index has no segment.
pub fn project(leveled: &str, nodes: &[usize]) -> Result<String> {
    let segments: Vec<&str> = leveled.split(KEY_SEPARATOR).collect();
    let mut group = String::new();
    for (i, &index) in nodes.iter().enumerate() {
        let segment = segments
            .get(index)
            .ok_or(EngineError::IndexOutOfRange { index, segments: segments.len() })?;
        if i > 0 {
            group.push(KEY_SEPARATOR);
        }
        group.push_str(segment);
    }
    Ok(group)
}

/// Fixed class of stored values, identified by its key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// Raw playback records.
    OriginalEvent,
    /// Per-event-type occurrence counts.
    EventHistogram,
    /// Number of sessions that became playable.
    PlayableCount,
    /// Summed time from load start to data loaded.
    PlayableSum,
    /// Summed reported video duration.
    DurationVideoSum,
    /// Summed time from playing to ended.
    DurationActualSum,
}

impl MetricFamily {
    /// Every family, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::OriginalEvent,
        Self::EventHistogram,
        Self::PlayableCount,
        Self::PlayableSum,
        Self::DurationVideoSum,
        Self::DurationActualSum,
    ];

    /// Returns the stored-key prefix of this family.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::OriginalEvent => "ORGE:",
            Self::EventHistogram => "AGGRHIST:",
            Self::PlayableCount => "AGGRTPLAYABLE_C:",
            Self::PlayableSum => "AGGRTPLAYABLE_S:",
            Self::DurationVideoSum => "AGGRADURATION_VS:",
            Self::DurationActualSum => "AGGRADURATION_AS:",
        }
    }

    /// Builds `prefix + key`.
    #[must_use]
    pub fn key(self, key: &str) -> String {
        let prefix = self.prefix();
        let mut full = String::with_capacity(prefix.len() + key.len());
        full.push_str(prefix);
        full.push_str(key);
        full
    }
}

/// Builds the scan prefix of one event type's histogram, `AGGRHIST:<event>:`.
#[must_use]
pub fn histogram_prefix(event: &str) -> String {
    let mut prefix = MetricFamily::EventHistogram.key(event);
    prefix.push(KEY_SEPARATOR);
    prefix
}

/// Builds the histogram counter key of `event` at `leveled`.
#[must_use]
pub fn histogram_key(event: &str, leveled: &str) -> String {
    let mut key = histogram_prefix(event);
    key.push_str(leveled);
    key
}

/// A ratio of two counter families that share a scan prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FractionKind {
    /// Mean time from load start to data loaded.
    PlayableLatency,
    /// Actual playback time relative to the reported video duration.
    PlaybackDuration,
}

impl FractionKind {
    /// Family summed into the numerator.
    #[must_use]
    pub const fn dividend(self) -> MetricFamily {
        match self {
            Self::PlayableLatency => MetricFamily::PlayableSum,
            Self::PlaybackDuration => MetricFamily::DurationActualSum,
        }
    }

    /// Family summed into the denominator.
    #[must_use]
    pub const fn divisor(self) -> MetricFamily {
        match self {
            Self::PlayableLatency => MetricFamily::PlayableCount,
            Self::PlaybackDuration => MetricFamily::DurationVideoSum,
        }
    }

    /// Prefix shared by both families; one scan reads them together.
    #[must_use]
    pub const fn scan_prefix(self) -> &'static str {
        match self {
            Self::PlayableLatency => "AGGRTPLAYABLE_",
            Self::PlaybackDuration => "AGGRADURATION_",
        }
    }

    /// Returns the name used on the query surface.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlayableLatency => "playable_latency",
            Self::PlaybackDuration => "playback_duration",
        }
    }
}

impl fmt::Display for FractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FractionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "playable_latency" | "playable-latency" | "playable" => Ok(Self::PlayableLatency),
            "playback_duration" | "playback-duration" | "duration" => Ok(Self::PlaybackDuration),
            other => Err(EngineError::BadRequest(format!("unknown fraction kind: {other}"))),
        }
    }
}
