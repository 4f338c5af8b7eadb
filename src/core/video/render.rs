use super::frame::{Frame, Region};
use crate::core::error::AnprError;
use image::Rgb;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rusttype::{Font, Scale};
use std::path::PathBuf;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 18.0;
/// Gap between the label baseline and the top edge of the box.
const LABEL_GAP: i32 = 10;

static LABEL_FONT: Lazy<Option<Font<'static>>> = Lazy::new(|| {
    Font::try_from_bytes(include_bytes!("../../../assets/fonts/DejaVuSansMono.ttf"))
});

/// On-screen annotation.
pub trait Renderer: Send {
    fn annotate(&mut self, frame: &mut Frame, region: &Region, text: &str);

    /// Called once per frame after all regions were annotated.
    fn present(&mut self, _frame: &Frame) -> Result<(), AnprError> {
        Ok(())
    }
}

pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn annotate(&mut self, _frame: &mut Frame, _region: &Region, _text: &str) {}
}

/// Draws a box around each read plate with the plate text just above it.
/// With a preview path the annotated frame is written there on every
/// `present`.
pub struct BoxRenderer {
    preview_path: Option<PathBuf>,
    annotated: u64,
}

impl BoxRenderer {
    pub fn new() -> Self {
        Self {
            preview_path: None,
            annotated: 0,
        }
    }

    pub fn with_preview(path: PathBuf) -> Self {
        Self {
            preview_path: Some(path),
            annotated: 0,
        }
    }

    pub fn annotated_count(&self) -> u64 {
        self.annotated
    }
}

impl Default for BoxRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for BoxRenderer {
    fn annotate(&mut self, frame: &mut Frame, region: &Region, text: &str) {
        if let Some(clamped) = region.clamp_to(frame.width(), frame.height()) {
            draw_box(frame, &clamped, BOX_COLOR, BOX_THICKNESS);
            draw_label(frame, &clamped, text, BOX_COLOR);
            self.annotated += 1;
            debug!("Annotated {} at {:?}", text, clamped);
        }
    }

    fn present(&mut self, frame: &Frame) -> Result<(), AnprError> {
        if let Some(path) = &self.preview_path {
            frame.image.save(path)?;
        }
        Ok(())
    }
}

impl Drop for BoxRenderer {
    fn drop(&mut self) {
        info!("🗑️ Renderer released ({} boxes drawn)", self.annotated);
    }
}

/// Rectangle outline `thickness` pixels wide, drawn inward from the region
/// edges.
fn draw_box(frame: &mut Frame, region: &Region, color: Rgb<u8>, thickness: u32) {
    for inset in 0..thickness {
        let (w, h) = (
            region.width().saturating_sub(2 * inset),
            region.height().saturating_sub(2 * inset),
        );
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((region.x1 + inset) as i32, (region.y1 + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(&mut frame.image, rect, color);
    }
}

/// Plate text with its baseline `LABEL_GAP` above the box, pushed down to
/// stay inside the frame.
fn draw_label(frame: &mut Frame, region: &Region, text: &str, color: Rgb<u8>) {
    let Some(font) = LABEL_FONT.as_ref() else {
        warn!("Label font unavailable, skipping text for {}", text);
        return;
    };
    let scale = Scale::uniform(LABEL_SCALE);
    let top = (region.y1 as i32 - LABEL_GAP - LABEL_SCALE as i32).max(0);
    draw_text_mut(&mut frame.image, color, region.x1 as i32, top, scale, font, text);
}
