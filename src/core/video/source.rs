use super::frame::Frame;
use crate::core::error::AnprError;
use log::{debug, info};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Camera / video input.
///
/// `Ok(None)` is end-of-stream. An `Err` is an acquisition failure, which the
/// frame loop also treats as the end of the stream.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, AnprError>;
}

/// Reads still images from a directory in file-name order, one per frame.
pub struct ImageDirSource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    frame_number: u64,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self, AnprError> {
        if !dir.is_dir() {
            return Err(AnprError::FrameSource(format!(
                "not a directory: {}",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        files.sort();

        info!("📷 Frame source opened: {} ({} frames)", dir.display(), files.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            pending: files.into(),
            frame_number: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, AnprError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let image = image::open(&path)
            .map_err(|e| AnprError::FrameSource(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        self.frame_number += 1;
        debug!("Frame {} <- {}", self.frame_number, path.display());
        Ok(Some(Frame::new(image, 0, self.frame_number)))
    }
}

impl Drop for ImageDirSource {
    fn drop(&mut self) {
        info!("🗑️ Frame source released: {}", self.dir.display());
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// In-memory frames, consumed front to back.
pub struct VecFrameSource {
    frames: VecDeque<Frame>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, AnprError> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, fill: u8) {
        RgbImage::from_pixel(8, 4, Rgb([fill, fill, fill]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_dir_source_reads_in_name_order() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "frame_002.png", 20);
        write_png(dir.path(), "frame_001.png", 10);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.frame_number, 1);
        assert_eq!(first.image.get_pixel(0, 0), &Rgb([10, 10, 10]));

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.frame_number, 2);
        assert_eq!(second.image.get_pixel(0, 0), &Rgb([20, 20, 20]));

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_dir_source_undecodable_frame_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert!(matches!(source.next_frame(), Err(AnprError::FrameSource(_))));
    }

    #[test]
    fn test_dir_source_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(ImageDirSource::open(&missing).is_err());
    }

    #[test]
    fn test_vec_source_exhausts() {
        let mut source = VecFrameSource::new(vec![Frame::filled(4, 4, 0, 1)]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
