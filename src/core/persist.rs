//! Plate persistence - image artifact plus one log line per saved plate.

use crate::core::error::AnprError;
use crate::core::video::Frame;
use log::info;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_LOG_FILE: &str = "detected_plates.txt";

pub trait PersistenceSink: Send {
    fn save(&mut self, image: &Frame, plate_text: &str, timestamp: &str) -> Result<(), AnprError>;
}

/// Writes `{plate}_{timestamp}.jpg` and appends `{timestamp} - {plate}` to the
/// log file, both inside one output directory.
pub struct DiskSink {
    output_dir: PathBuf,
    log_path: PathBuf,
    jpeg_quality: u8,
}

impl DiskSink {
    /// Creates the output directory if it does not exist yet.
    pub fn open(output_dir: &Path, log_file_name: &str, jpeg_quality: u8) -> Result<Self, AnprError> {
        fs::create_dir_all(output_dir)?;
        info!("💾 Plate output directory: {}", output_dir.display());
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            log_path: output_dir.join(log_file_name),
            jpeg_quality,
        })
    }

    pub fn image_path(&self, plate_text: &str, timestamp: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}.jpg", plate_text, timestamp))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl PersistenceSink for DiskSink {
    fn save(&mut self, image: &Frame, plate_text: &str, timestamp: &str) -> Result<(), AnprError> {
        let jpeg = image.encode_jpeg(self.jpeg_quality)?;
        fs::write(self.image_path(plate_text, timestamp), jpeg)?;

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(log, "{} - {}", timestamp, plate_text)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedPlate {
    pub plate_text: String,
    pub timestamp: String,
    pub width: u32,
    pub height: u32,
}

/// Keeps saved plates in memory. Clones share storage, so a test can hold one
/// handle while the loop owns another.
#[derive(Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<SavedPlate>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<SavedPlate> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PersistenceSink for MemorySink {
    fn save(&mut self, image: &Frame, plate_text: &str, timestamp: &str) -> Result<(), AnprError> {
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SavedPlate {
                plate_text: plate_text.to_string(),
                timestamp: timestamp.to_string(),
                width: image.width(),
                height: image.height(),
            });
        Ok(())
    }
}
