//! Origin classification of playback targets.
//!
//! The first two segments of a record key come from the target URL: the
//! host decides which delivery path served the media, the last path segment
//! names the video.

use std::fmt;

use url::Url;

use crate::{
    error::{EngineError, Result},
    keys::KEY_SEPARATOR,
};

/// Delivery path that served a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginTag {
    /// Served straight from an S3 bucket.
    S3,
    /// Served through CloudFront.
    CloudFront,
    /// Anything else.
    Edge,
}

impl OriginTag {
    /// Classifies a hostname by suffix. Pure: the same host always yields
    /// the same tag.
    #[must_use]
    pub fn classify(host: &str) -> Self {
        if host.ends_with("s3.amazonaws.com") {
            Self::S3
        } else if host.ends_with("cloudfront.net") {
            Self::CloudFront
        } else {
            Self::Edge
        }
    }

    /// Returns the key segment for this tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "S3",
            Self::CloudFront => "CloudFront",
            Self::Edge => "Edge",
        }
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin and video name resolved from a target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Origin classification of the host.
    pub origin: OriginTag,
    /// Last non-empty path segment, still percent-encoded.
    pub video: String,
}

/// Resolves `target` into its origin tag and video basename.
///
/// Trailing slashes are ignored, so `/videos/a.mp4/` names `a.mp4`.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRecord`] if the URL does not parse, has no
/// host, has an empty path, or its basename contains the key separator.
pub fn resolve_target(target: &str) -> Result<ResolvedTarget> {
    let url = Url::parse(target)
        .map_err(|e| EngineError::InvalidRecord(format!("unparseable target {target:?}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| EngineError::InvalidRecord(format!("target has no host: {target}")))?;
    let video = video_basename(url.path())
        .ok_or_else(|| EngineError::InvalidRecord(format!("target has no video path: {target}")))?;
    if video.contains(KEY_SEPARATOR) {
        return Err(EngineError::InvalidRecord(format!("video name contains ':': {video}")));
    }
    Ok(ResolvedTarget { origin: OriginTag::classify(host), video: video.to_owned() })
}

fn video_basename(path: &str) -> Option<&str> {
    let (_, name) = path.trim_end_matches('/').rsplit_once('/')?;
    (!name.is_empty()).then_some(name)
}
