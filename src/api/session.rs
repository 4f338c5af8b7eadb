//! 车牌识别会话 - the process-wide context: configuration, collaborators and
//! the frame loop, built once at startup and torn down when dropped.
//!
//! ```no_run
//! use anpr_lib::api::session::{AnprSession, DetectorKind, SessionOptions};
//! use anpr_lib::core::inference::SidecarConfig;
//! use anpr_lib::frame_loop::{AnprConfig, CancelFlag};
//!
//! let mut options = SessionOptions::new("frames/".into(), DetectorKind::Worker);
//! options.worker = Some(SidecarConfig::new("anpr-model-worker"));
//! let mut session = AnprSession::open(AnprConfig::default(), options)?;
//! let reason = session.run(&CancelFlag::new());
//! println!("{:?} {:?}", reason, session.stats());
//! # Ok::<(), anpr_lib::core::AnprError>(())
//! ```

use crate::core::anpr::SystemClock;
use crate::core::error::AnprError;
use crate::core::inference::{SidecarConfig, SidecarWorker};
use crate::core::persist::DiskSink;
use crate::core::video::{BoxRenderer, FullFrameDetector, ImageDirSource, PlateDetector};
use crate::frame_loop::{
    AnprConfig, CancelFlag, Collaborators, FrameEventLoop, LoopStats, StopReason,
};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// Each frame is already a plate crop.
    FullFrame,
    /// Ask the model worker for plate boxes.
    Worker,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub source_dir: PathBuf,
    pub detector: DetectorKind,
    /// Model worker; required for OCR.
    pub worker: Option<SidecarConfig>,
    pub preview_path: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new(source_dir: PathBuf, detector: DetectorKind) -> Self {
        Self {
            source_dir,
            detector,
            worker: None,
            preview_path: None,
        }
    }
}

pub struct AnprSession {
    event_loop: FrameEventLoop,
    parts: Collaborators,
}

impl AnprSession {
    /// Assemble a session from ready-made collaborators.
    pub fn create(config: AnprConfig, parts: Collaborators) -> Result<Self, AnprError> {
        let event_loop = FrameEventLoop::new(config)?;
        info!("🎬 AnprSession: created");
        Ok(Self { event_loop, parts })
    }

    /// Wire up the on-disk frame source, model worker, disk sink and renderer.
    pub fn open(config: AnprConfig, options: SessionOptions) -> Result<Self, AnprError> {
        config.validate()?;

        let worker_config = options
            .worker
            .clone()
            .ok_or_else(|| AnprError::Config("no OCR worker configured".into()))?;
        let worker = Arc::new(SidecarWorker::start(worker_config)?);

        let source = ImageDirSource::open(&options.source_dir)?;
        let sink = DiskSink::open(&config.output_dir, &config.log_file_name, config.jpeg_quality)?;
        let renderer = match options.preview_path {
            Some(path) => BoxRenderer::with_preview(path),
            None => BoxRenderer::new(),
        };

        let detector: Box<dyn PlateDetector> = match options.detector {
            DetectorKind::FullFrame => Box::new(FullFrameDetector),
            DetectorKind::Worker => Box::new(Arc::clone(&worker)),
        };

        let parts = Collaborators {
            source: Box::new(source),
            detector,
            ocr: Box::new(worker),
            sink: Box::new(sink),
            renderer: Box::new(renderer),
            clock: Box::new(SystemClock::new()),
        };

        Self::create(config, parts)
    }

    pub fn run(&mut self, cancel: &CancelFlag) -> StopReason {
        self.event_loop.run(&mut self.parts, cancel)
    }

    pub fn stats(&self) -> LoopStats {
        self.event_loop.stats()
    }

    pub fn tracked_plates(&self) -> usize {
        self.event_loop.gate().len()
    }
}

impl Drop for AnprSession {
    fn drop(&mut self) {
        info!(
            "🗑️ AnprSession: releasing resources ({} plates saved)",
            self.event_loop.stats().persisted
        );
    }
}
