use image::{imageops, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::time::Duration;

use crate::core::error::AnprError;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_ms: u64, frame_number: u64) -> Self {
        Self {
            image,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// Uniform frame, handy for tests and placeholders.
    pub fn filled(width: u32, height: u32, fill: u8, frame_number: u64) -> Self {
        let image = RgbImage::from_pixel(width, height, Rgb([fill, fill, fill]));
        Self::new(image, 0, frame_number)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> usize {
        (self.width() * self.height()) as usize
    }

    /// Copy out `region`, clamped to the frame. `None` when nothing is left.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let clamped = region.clamp_to(self.width(), self.height())?;
        let cropped = imageops::crop_imm(
            &self.image,
            clamped.x1,
            clamped.y1,
            clamped.width(),
            clamped.height(),
        )
        .to_image();

        Some(Frame {
            image: cropped,
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        })
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, AnprError> {
        self.encode(ImageOutputFormat::Png)
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, AnprError> {
        self.encode(ImageOutputFormat::Jpeg(quality))
    }

    fn encode(&self, format: ImageOutputFormat) -> Result<Vec<u8>, AnprError> {
        let mut buffer = Cursor::new(Vec::new());
        self.image.write_to(&mut buffer, format)?;
        Ok(buffer.into_inner())
    }
}

/// Axis-aligned detector box, corners in pixels, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Region {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// From signed model output; negative coordinates are clamped to 0.
    pub fn from_signed(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let clamp = |v: i64| v.clamp(0, u32::MAX as i64) as u32;
        Self::new(clamp(x1), clamp(y1), clamp(x2), clamp(y2))
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        let clamped = Region {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        };
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }
}
