use crate::core::anpr::{FallbackPolicy, PlateFormat, TextNormalizer, DEFAULT_PLATE_PATTERN};
use crate::core::error::AnprError;
use crate::core::persist::DEFAULT_LOG_FILE;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Frame loop settings. Loaded from a JSON5 file; absent keys keep defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnprConfig {
    /// Seconds before the same plate may be saved again. Negative disables
    /// suppression.
    pub cooldown_secs: f64,
    pub plate_pattern: String,
    /// Drop readings that do not match `plate_pattern` instead of saving the
    /// raw concatenation.
    pub strict_format: bool,
    /// Max plates remembered by the dedup gate; 0 is unbounded.
    pub history_capacity: usize,
    /// Every N frames, forget plates whose cooldown already ran out; 0 never.
    pub sweep_interval_frames: u64,
    /// OCR all regions of a frame in parallel. Decisions stay in detector
    /// order.
    pub parallel_ocr: bool,
    pub output_dir: PathBuf,
    pub log_file_name: String,
    pub jpeg_quality: u8,
}

impl Default for AnprConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 8.0,
            plate_pattern: DEFAULT_PLATE_PATTERN.to_string(),
            strict_format: false,
            history_capacity: 0,
            sweep_interval_frames: 300,
            parallel_ocr: false,
            output_dir: PathBuf::from("plates"),
            log_file_name: DEFAULT_LOG_FILE.to_string(),
            jpeg_quality: 90,
        }
    }
}

impl AnprConfig {
    pub fn load(path: &Path) -> Result<Self, AnprError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json5(&raw)
    }

    pub fn from_json5(raw: &str) -> Result<Self, AnprError> {
        let config: AnprConfig = json5::from_str(raw)
            .map_err(|e| AnprError::Config(format!("config parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnprError> {
        if !self.cooldown_secs.is_finite() {
            return Err(AnprError::Config(format!(
                "cooldown_secs must be finite, got {}",
                self.cooldown_secs
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AnprError::Config(format!(
                "jpeg_quality must be 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.log_file_name.is_empty() {
            return Err(AnprError::Config("log_file_name is empty".into()));
        }
        PlateFormat::new(&self.plate_pattern)?;
        Ok(())
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        if self.strict_format {
            FallbackPolicy::Reject
        } else {
            FallbackPolicy::Candidate
        }
    }

    pub fn build_normalizer(&self) -> Result<TextNormalizer, AnprError> {
        let format = PlateFormat::new(&self.plate_pattern)?;
        Ok(TextNormalizer::with_format(format, self.fallback_policy()))
    }
}
