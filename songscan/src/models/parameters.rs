//! Scan parameters forwarded to the recognizer
//!
//! Field names on the wire are camelCase (`lyricsPreviewWords`, `minConfidence`, ...).
//! Every field is optional; defaults match the recognizer's documented defaults.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Recognizer tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanParameters {
    /// Market/region code for catalogue lookups (default: "us")
    pub market: String,

    /// Words of lyrics to include per segment (default: 10)
    pub lyrics_preview_words: u32,

    /// Analysis window length in seconds (default: 12)
    pub window: f64,

    /// Hop between windows in seconds (default: 6)
    pub hop: f64,

    /// Minimum match confidence, 0.0 - 1.0 (default: 0.6)
    pub min_confidence: f64,

    /// Minimum span for a reported segment in seconds (default: 8)
    pub min_span: f64,

    /// Largest gap merged between adjacent same-song segments in seconds (default: 3)
    pub merge_gap: f64,

    /// Recognizer worker concurrency (default: 3)
    pub concurrency: u32,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            market: "us".to_string(),
            lyrics_preview_words: 10,
            window: 12.0,
            hop: 6.0,
            min_confidence: 0.6,
            min_span: 8.0,
            merge_gap: 3.0,
            concurrency: 3,
        }
    }
}

/// Multipart/form field names accepted by [`ScanParameters::apply_field`]
pub const PARAMETER_FIELDS: [&str; 8] = [
    "market",
    "lyricsPreviewWords",
    "window",
    "hop",
    "minConfidence",
    "minSpan",
    "mergeGap",
    "concurrency",
];

impl ScanParameters {
    /// Apply one form field by its wire name
    ///
    /// Returns `Ok(false)` for names that are not scan parameters so callers
    /// can ignore unrelated fields. Blank values keep the default.
    pub fn apply_field(&mut self, name: &str, value: &str) -> Result<bool, ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(PARAMETER_FIELDS.contains(&name));
        }

        match name {
            "market" => self.market = value.to_string(),
            "lyricsPreviewWords" => self.lyrics_preview_words = parse_field(name, value)?,
            "window" => self.window = parse_field(name, value)?,
            "hop" => self.hop = parse_field(name, value)?,
            "minConfidence" => self.min_confidence = parse_field(name, value)?,
            "minSpan" => self.min_span = parse_field(name, value)?,
            "mergeGap" => self.merge_gap = parse_field(name, value)?,
            "concurrency" => self.concurrency = parse_field(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Check ranges the recognizer cannot handle
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.market.is_empty() || self.market.chars().any(char::is_whitespace) {
            return Err(invalid("market", "must be a single non-empty token"));
        }
        if !(self.window.is_finite() && self.window > 0.0) {
            return Err(invalid("window", "must be greater than 0"));
        }
        if !(self.hop.is_finite() && self.hop > 0.0) {
            return Err(invalid("hop", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("minConfidence", "must be between 0 and 1"));
        }
        if !(self.min_span.is_finite() && self.min_span >= 0.0) {
            return Err(invalid("minSpan", "must not be negative"));
        }
        if !(self.merge_gap.is_finite() && self.merge_gap >= 0.0) {
            return Err(invalid("mergeGap", "must not be negative"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        Ok(())
    }

    /// Serialize as recognizer command-line flags
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--market".to_string(),
            self.market.clone(),
            "--lyrics-preview-words".to_string(),
            self.lyrics_preview_words.to_string(),
            "--window".to_string(),
            self.window.to_string(),
            "--hop".to_string(),
            self.hop.to_string(),
            "--min-confidence".to_string(),
            self.min_confidence.to_string(),
            "--min-span".to_string(),
            self.min_span.to_string(),
            "--merge-gap".to_string(),
            self.merge_gap.to_string(),
            "--concurrency".to_string(),
            self.concurrency.to_string(),
        ]
    }

    /// Form fields for submitting these parameters to `POST /scan`
    pub fn to_form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("market", self.market.clone()),
            ("lyricsPreviewWords", self.lyrics_preview_words.to_string()),
            ("window", self.window.to_string()),
            ("hop", self.hop.to_string()),
            ("minConfidence", self.min_confidence.to_string()),
            ("minSpan", self.min_span.to_string()),
            ("mergeGap", self.merge_gap.to_string()),
            ("concurrency", self.concurrency.to_string()),
        ]
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ValidationError> {
    value
        .parse()
        .map_err(|_| invalid(name, &format!("cannot parse '{}'", value)))
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidParameter {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
