use super::frame::{Frame, Region};
use crate::core::error::AnprError;
use std::sync::Arc;

/// Plate detector capability: regions of interest for one frame, in the
/// detector's own order. An empty list is a normal result.
pub trait PlateDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, AnprError>;
}

impl<T: PlateDetector + ?Sized> PlateDetector for Arc<T> {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, AnprError> {
        (**self).detect(frame)
    }
}

/// One region covering the whole frame, for inputs that are already plate
/// crops.
pub struct FullFrameDetector;

impl PlateDetector for FullFrameDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, AnprError> {
        let region = Region::full(frame.width(), frame.height());
        if region.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![region])
    }
}

pub struct MockPlateDetector {
    // 按帧号返回预设的区域
    regions_for_frame: Option<Box<dyn Fn(u64) -> Vec<Region> + Send + Sync>>,
}

impl MockPlateDetector {
    pub fn new() -> Self {
        Self {
            regions_for_frame: None,
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Vec<Region> + Send + Sync + 'static,
    {
        Self {
            regions_for_frame: Some(Box::new(pattern)),
        }
    }

    /// Same regions on every frame.
    pub fn with_regions(regions: Vec<Region>) -> Self {
        Self::with_pattern(move |_| regions.clone())
    }
}

impl Default for MockPlateDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlateDetector for MockPlateDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, AnprError> {
        Ok(self
            .regions_for_frame
            .as_ref()
            .map(|p| p(frame.frame_number))
            .unwrap_or_default())
    }
}
