//! Recognized segment records produced by the recognizer

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One recognized song occurrence on the media timeline
///
/// The recognizer is an opaque collaborator. Its key spelling is kept on the
/// way out, every known field may be absent or `null`, and fields beyond the
/// ones below (`start_hms`, `isrc`, ...) are kept in `extra` unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSegment {
    /// Segment start, seconds from the beginning of the media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    /// Segment end, seconds from the beginning of the media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Match confidence (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Short lyric excerpt
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "lyricsPreview",
        alias = "lyrics",
        alias = "lyric_excerpt"
    )]
    pub lyrics_preview: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RecognizedSegment {
    /// Clamp confidence into 0.0 - 1.0 (NaN becomes 0.0)
    pub fn normalize(&mut self) {
        if let Some(confidence) = self.confidence.as_mut() {
            *confidence = if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            };
        }
    }
}

/// Normalize every segment and order them along the timeline
///
/// The sort is stable so segments sharing a start time keep recognizer order.
/// Segments without a numeric start follow the timed ones in recognizer order.
pub fn into_timeline(mut segments: Vec<RecognizedSegment>) -> Vec<RecognizedSegment> {
    for segment in &mut segments {
        segment.normalize();
    }
    segments.sort_by(|a, b| match (a.start, b.start) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    segments
}
