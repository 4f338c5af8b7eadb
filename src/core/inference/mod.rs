//! Model capabilities consumed by the frame loop.
//! The detector trait lives with the video types; OCR lives here, together
//! with the worker-process client that can serve both.

pub mod sidecar;

use crate::core::error::AnprError;
use crate::core::video::Frame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use sidecar::{SidecarConfig, SidecarWorker};

/// One OCR result for a cropped region. Confidence is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub confidence: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// OCR capability: zero or more spans, in reading order, for a plate crop.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, region: &Frame) -> Result<Vec<TextSpan>, AnprError>;
}

impl<T: OcrEngine + ?Sized> OcrEngine for Arc<T> {
    fn recognize(&self, region: &Frame) -> Result<Vec<TextSpan>, AnprError> {
        (**self).recognize(region)
    }
}

/// Canned OCR output keyed by frame number, for tests and dry runs.
/// Frames without a script read as nothing.
pub struct ScriptedOcrEngine {
    scripts: HashMap<u64, Vec<TextSpan>>,
    calls: Mutex<u64>,
}

impl ScriptedOcrEngine {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: Mutex::new(0),
        }
    }

    pub fn with_frame(mut self, frame_number: u64, spans: Vec<TextSpan>) -> Self {
        self.scripts.insert(frame_number, spans);
        self
    }

    pub fn calls(&self) -> u64 {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ScriptedOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn recognize(&self, region: &Frame) -> Result<Vec<TextSpan>, AnprError> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(self
            .scripts
            .get(&region.frame_number)
            .cloned()
            .unwrap_or_default())
    }
}
