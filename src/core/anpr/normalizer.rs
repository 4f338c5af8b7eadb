//! OCR 文本规整 - turns the spans read from one plate crop into a single
//! canonical plate string.
//!
//! Spans are uppercased, stripped of whitespace, filtered (alphanumeric and at
//! least two characters), concatenated in engine order, and then searched for
//! the regional plate format. The leftmost format match wins; without a match
//! the whole concatenation is returned unless strict mode is on.

use crate::core::error::AnprError;
use crate::core::inference::TextSpan;
use once_cell::sync::Lazy;
use regex::Regex;

/// Two letters, two digits, one or two alphanumerics, four digits.
pub const DEFAULT_PLATE_PATTERN: &str = r"[A-Z]{2}[0-9]{2}[A-Z0-9]{1,2}[0-9]{4}";

/// Spans shorter than this are treated as OCR noise (bolt holes, borders).
pub const MIN_SPAN_LEN: usize = 2;

static DEFAULT_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_PLATE_PATTERN).expect("default plate pattern is valid"));

/// Regional plate format, matched anywhere inside the candidate.
#[derive(Debug, Clone)]
pub struct PlateFormat {
    pattern: Regex,
}

impl PlateFormat {
    /// Patterns that can match the empty string are rejected: they would turn
    /// a real reading into an empty plate.
    pub fn new(pattern: &str) -> Result<Self, AnprError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| AnprError::Config(format!("invalid plate pattern: {}", e)))?;
        if pattern.is_match("") {
            return Err(AnprError::Config(format!(
                "plate pattern matches the empty string: {}",
                pattern.as_str()
            )));
        }
        Ok(Self { pattern })
    }

    /// Leftmost match inside `candidate`, if any.
    pub fn find<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        self.pattern.find(candidate).map(|m| m.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for PlateFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_FORMAT.clone(),
        }
    }
}

/// What to do when the concatenated candidate does not match the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Report the whole candidate (recall over precision).
    Candidate,
    /// Report nothing.
    Reject,
}

/// Normalized reading of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateReading {
    pub text: String,
    pub format_matched: bool,
}

impl PlateReading {
    fn empty() -> Self {
        Self {
            text: String::new(),
            format_matched: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub struct TextNormalizer {
    format: PlateFormat,
    fallback: FallbackPolicy,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self::with_format(PlateFormat::default(), FallbackPolicy::Candidate)
    }

    pub fn with_format(format: PlateFormat, fallback: FallbackPolicy) -> Self {
        Self { format, fallback }
    }

    pub fn format(&self) -> &PlateFormat {
        &self.format
    }

    /// Canonical plate string for `spans`; empty means "nothing usable".
    pub fn normalize(&self, spans: &[TextSpan]) -> String {
        self.normalize_reading(spans).text
    }

    pub fn normalize_reading(&self, spans: &[TextSpan]) -> PlateReading {
        if spans.is_empty() {
            return PlateReading::empty();
        }

        let candidate: String = spans
            .iter()
            .filter_map(|span| clean_span(&span.text))
            .collect();

        if candidate.is_empty() {
            return PlateReading::empty();
        }

        if let Some(found) = self.format.find(&candidate) {
            return PlateReading {
                text: found.to_string(),
                format_matched: true,
            };
        }

        match self.fallback {
            FallbackPolicy::Candidate => PlateReading {
                text: candidate,
                format_matched: false,
            },
            FallbackPolicy::Reject => PlateReading::empty(),
        }
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Uppercase, drop whitespace, then keep only `[A-Z0-9]{2,}`.
fn clean_span(text: &str) -> Option<String> {
    let cleaned: String = text
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.chars().count() < MIN_SPAN_LEN {
        return None;
    }
    if !cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(cleaned)
}
