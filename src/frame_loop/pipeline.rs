use crate::core::anpr::{Clock, DedupGate, DedupReason, TextNormalizer};
use crate::core::error::AnprError;
use crate::core::inference::{OcrEngine, TextSpan};
use crate::core::persist::PersistenceSink;
use crate::core::video::{Frame, FrameSource, PlateDetector, Region, Renderer};
use crate::frame_loop::cancel::CancelFlag;
use crate::frame_loop::config::AnprConfig;
use log::{debug, error, info, warn};
use rayon::prelude::*;

/// External collaborators the loop drives, owned for the loop's lifetime.
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn PlateDetector>,
    pub ocr: Box<dyn OcrEngine>,
    pub sink: Box<dyn PersistenceSink>,
    pub renderer: Box<dyn Renderer>,
    pub clock: Box<dyn Clock>,
}

/// 处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_processed: u64,
    pub source_failures: u64,
    pub regions_detected: u64,
    pub empty_regions_skipped: u64,
    pub readings: u64,
    pub persisted: u64,
    pub suppressed: u64,
    pub persist_failures: u64,
    pub detector_failures: u64,
    pub ocr_failures: u64,
}

/// Why `run` returned. A frame-acquisition failure counts as end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
}

/// What happened to one region of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    EmptyCrop,
    OcrFailed,
    NoText,
    Persisted { plate: String },
    PersistFailed { plate: String },
    Suppressed { plate: String },
}

/// Single-threaded per-frame orchestration:
/// detect -> crop -> OCR -> normalize -> dedup -> persist, annotate.
pub struct FrameEventLoop {
    normalizer: TextNormalizer,
    gate: DedupGate,
    config: AnprConfig,
    stats: LoopStats,
}

impl FrameEventLoop {
    pub fn new(config: AnprConfig) -> Result<Self, AnprError> {
        config.validate()?;
        Ok(Self {
            normalizer: config.build_normalizer()?,
            gate: DedupGate::with_capacity(config.history_capacity),
            config,
            stats: LoopStats::default(),
        })
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn gate(&self) -> &DedupGate {
        &self.gate
    }

    pub fn config(&self) -> &AnprConfig {
        &self.config
    }

    /// Pump frames until the source is exhausted, fails, or `cancel` is set.
    pub fn run(&mut self, parts: &mut Collaborators, cancel: &CancelFlag) -> StopReason {
        info!("🚗 Frame loop started (cooldown {}s)", self.config.cooldown_secs);

        let reason = loop {
            let mut frame = match parts.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => {
                    warn!("Frame acquisition failed, stopping: {}", e);
                    self.stats.source_failures += 1;
                    break StopReason::EndOfStream;
                }
            };

            self.process_frame(&mut frame, parts);

            if let Err(e) = parts.renderer.present(&frame) {
                warn!("Render failed for frame {}: {}", frame.frame_number, e);
            }

            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
        };

        info!("🏁 Frame loop stopped ({:?}): {:?}", reason, self.stats);
        reason
    }

    /// Handle every detected region of `frame`, in detector order.
    pub fn process_frame(
        &mut self,
        frame: &mut Frame,
        parts: &mut Collaborators,
    ) -> Vec<RegionOutcome> {
        self.stats.frames_processed += 1;
        self.maybe_sweep(parts.clock.now_secs());

        let regions = match parts.detector.detect(frame) {
            Ok(regions) => regions,
            Err(e) => {
                warn!("Detector failed on frame {}: {}", frame.frame_number, e);
                self.stats.detector_failures += 1;
                return Vec::new();
            }
        };
        self.stats.regions_detected += regions.len() as u64;

        // Crops come from the frame before any annotation is drawn.
        let crops: Vec<(Region, Option<Frame>)> =
            regions.iter().map(|r| (*r, frame.crop(r))).collect();

        let readings = self.recognize_all(&crops, parts.ocr.as_ref());

        crops
            .into_iter()
            .zip(readings)
            .map(|((region, crop), spans)| match crop {
                None => {
                    self.stats.empty_regions_skipped += 1;
                    RegionOutcome::EmptyCrop
                }
                Some(crop) => self.handle_region(frame, &region, &crop, spans, parts),
            })
            .collect()
    }

    fn recognize_all(
        &self,
        crops: &[(Region, Option<Frame>)],
        ocr: &dyn OcrEngine,
    ) -> Vec<Option<Result<Vec<TextSpan>, AnprError>>> {
        let recognize =
            |(_, crop): &(Region, Option<Frame>)| crop.as_ref().map(|c| ocr.recognize(c));

        if self.config.parallel_ocr && crops.len() > 1 {
            crops.par_iter().map(recognize).collect()
        } else {
            crops.iter().map(recognize).collect()
        }
    }

    fn handle_region(
        &mut self,
        frame: &mut Frame,
        region: &Region,
        crop: &Frame,
        spans: Option<Result<Vec<TextSpan>, AnprError>>,
        parts: &mut Collaborators,
    ) -> RegionOutcome {
        let spans = match spans {
            Some(Ok(spans)) => spans,
            Some(Err(e)) => {
                warn!("OCR failed on frame {} {:?}: {}", frame.frame_number, region, e);
                self.stats.ocr_failures += 1;
                return RegionOutcome::OcrFailed;
            }
            None => return RegionOutcome::EmptyCrop,
        };

        let reading = self.normalizer.normalize_reading(&spans);
        if reading.is_empty() {
            return RegionOutcome::NoText;
        }
        self.stats.readings += 1;
        let plate = reading.text;
        info!("🔎 Final Plate: {} (format match: {})", plate, reading.format_matched);

        parts.renderer.annotate(frame, region, &plate);

        let now = parts.clock.now_secs();
        let decision = self.gate.check(&plate, now, self.config.cooldown_secs);
        if !decision.eligible {
            debug!(
                "Suppressed {} ({:?}, {:?}s since last)",
                plate, decision.reason, decision.since_last
            );
            self.stats.suppressed += 1;
            return RegionOutcome::Suppressed { plate };
        }

        let timestamp = parts.clock.timestamp();
        match parts.sink.save(crop, &plate, &timestamp) {
            Ok(()) => {
                let tag = if decision.reason == DedupReason::FirstSighting { "new" } else { "again" };
                info!("✅ Saved plate {} ({}, {})", plate, tag, timestamp);
                self.stats.persisted += 1;
                RegionOutcome::Persisted { plate }
            }
            Err(e) => {
                error!("❌ Failed to save plate {}: {}", plate, e);
                self.stats.persist_failures += 1;
                RegionOutcome::PersistFailed { plate }
            }
        }
    }

    fn maybe_sweep(&mut self, now: f64) {
        let every = self.config.sweep_interval_frames;
        if every == 0 || self.stats.frames_processed % every != 0 {
            return;
        }
        let removed = self.gate.evict_expired(now, self.config.cooldown_secs);
        if removed > 0 {
            debug!("Dedup sweep dropped {} expired plates, {} left", removed, self.gate.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::anpr::ManualClock;
    use crate::core::inference::ScriptedOcrEngine;
    use crate::core::persist::MemorySink;
    use crate::core::video::{BoxRenderer, MockPlateDetector, NullRenderer, VecFrameSource};
    use std::sync::{Arc, Mutex};

    const PLATE_BOX: Region = Region {
        x1: 10,
        y1: 10,
        x2: 70,
        y2: 30,
    };

    fn plate_spans() -> Vec<TextSpan> {
        vec![TextSpan::new("mh", 0.95), TextSpan::new("12ab3456", 0.91)]
    }

    fn frames(count: u64) -> Vec<Frame> {
        (1..=count).map(|n| Frame::filled(100, 50, 0, n)).collect()
    }

    fn parts(
        frames: Vec<Frame>,
        detector: MockPlateDetector,
        ocr: ScriptedOcrEngine,
        sink: &MemorySink,
        clock: &ManualClock,
    ) -> Collaborators {
        Collaborators {
            source: Box::new(VecFrameSource::new(frames)),
            detector: Box::new(detector),
            ocr: Box::new(ocr),
            sink: Box::new(sink.clone()),
            renderer: Box::new(NullRenderer),
            clock: Box::new(clock.clone()),
        }
    }

    /// Source that advances the manual clock to a scheduled time per frame.
    struct TimedSource {
        inner: VecFrameSource,
        clock: ManualClock,
        times: Vec<f64>,
        index: usize,
    }

    impl FrameSource for TimedSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, AnprError> {
            if let Some(t) = self.times.get(self.index) {
                self.clock.set(*t);
            }
            self.index += 1;
            self.inner.next_frame()
        }
    }

    struct FailingSink;

    impl PersistenceSink for FailingSink {
        fn save(&mut self, _: &Frame, _: &str, _: &str) -> Result<(), AnprError> {
            Err(AnprError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, AnprError> {
            Err(AnprError::FrameSource("camera unplugged".into()))
        }
    }

    /// Records every annotation.
    #[derive(Clone, Default)]
    struct RecordingRenderer {
        labels: Arc<Mutex<Vec<String>>>,
        presented: Arc<Mutex<u64>>,
    }

    impl Renderer for RecordingRenderer {
        fn annotate(&mut self, _frame: &mut Frame, _region: &Region, text: &str) {
            self.labels.lock().unwrap().push(text.to_string());
        }

        fn present(&mut self, _frame: &Frame) -> Result<(), AnprError> {
            *self.presented.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_cooldown_scenario_end_to_end() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let ocr = (1..=3).fold(ScriptedOcrEngine::new(), |ocr, n| ocr.with_frame(n, plate_spans()));

        let mut parts = parts(
            Vec::new(),
            MockPlateDetector::with_regions(vec![PLATE_BOX]),
            ocr,
            &sink,
            &clock,
        );
        parts.source = Box::new(TimedSource {
            inner: VecFrameSource::new(frames(3)),
            clock: clock.clone(),
            times: vec![0.0, 3.0, 12.0],
            index: 0,
        });

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        let reason = event_loop.run(&mut parts, &CancelFlag::new());
        assert_eq!(reason, StopReason::EndOfStream);

        let saved = sink.saved();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].plate_text, "MH12AB3456");
        assert_eq!(saved[0].timestamp, "20240101_000000");
        assert_eq!((saved[0].width, saved[0].height), (60, 20));
        assert_eq!(saved[1].timestamp, "20240101_000012");

        assert_eq!(event_loop.gate().last_persisted_at("MH12AB3456"), Some(12.0));
        let stats = event_loop.stats();
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.readings, 3);
        assert_eq!(stats.persisted, 2);
        assert_eq!(stats.suppressed, 1);
    }

    #[test]
    fn test_region_outcomes_in_detector_order() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let detector = MockPlateDetector::with_regions(vec![
            PLATE_BOX,
            Region::new(40, 40, 40, 45),
            Region::new(0, 0, 20, 20),
        ]);
        let ocr = ScriptedOcrEngine::new().with_frame(1, plate_spans());
        let mut parts = parts(Vec::new(), detector, ocr, &sink, &clock);

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        let mut frame = Frame::filled(100, 50, 0, 1);
        let outcomes = event_loop.process_frame(&mut frame, &mut parts);

        // Same scripted spans for every crop of frame 1.
        assert_eq!(
            outcomes,
            vec![
                RegionOutcome::Persisted { plate: "MH12AB3456".into() },
                RegionOutcome::EmptyCrop,
                RegionOutcome::Suppressed { plate: "MH12AB3456".into() },
            ]
        );
        assert_eq!(event_loop.stats().empty_regions_skipped, 1);
    }

    #[test]
    fn test_empty_crop_never_reaches_ocr() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let ocr = Arc::new(ScriptedOcrEngine::new());
        let mut parts = parts(
            frames(1),
            MockPlateDetector::with_regions(vec![Region::new(5, 5, 5, 20)]),
            ScriptedOcrEngine::new(),
            &sink,
            &clock,
        );
        parts.ocr = Box::new(Arc::clone(&ocr));

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        event_loop.run(&mut parts, &CancelFlag::new());

        assert_eq!(ocr.calls(), 0);
        assert!(sink.saved().is_empty());
    }

    #[test]
    fn test_annotation_ignores_dedup_result() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let renderer = RecordingRenderer::default();
        let ocr = ScriptedOcrEngine::new()
            .with_frame(1, plate_spans())
            .with_frame(2, plate_spans())
            .with_frame(3, vec![TextSpan::new("-", 0.4)]);

        let mut parts = parts(
            frames(3),
            MockPlateDetector::with_regions(vec![PLATE_BOX]),
            ocr,
            &sink,
            &clock,
        );
        parts.renderer = Box::new(renderer.clone());

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        event_loop.run(&mut parts, &CancelFlag::new());

        // Frame 2 is suppressed but still drawn; frame 3 has no text.
        assert_eq!(*renderer.labels.lock().unwrap(), vec!["MH12AB3456", "MH12AB3456"]);
        assert_eq!(*renderer.presented.lock().unwrap(), 3);
        assert_eq!(sink.saved().len(), 1);
    }

    #[test]
    fn test_persist_failure_does_not_stop_loop() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let ocr = ScriptedOcrEngine::new()
            .with_frame(1, plate_spans())
            .with_frame(2, vec![TextSpan::new("KA05XY9999", 0.9)]);
        let mut parts = parts(
            frames(2),
            MockPlateDetector::with_regions(vec![PLATE_BOX]),
            ocr,
            &sink,
            &clock,
        );
        parts.sink = Box::new(FailingSink);

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        let reason = event_loop.run(&mut parts, &CancelFlag::new());

        assert_eq!(reason, StopReason::EndOfStream);
        let stats = event_loop.stats();
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.persist_failures, 2);
        // The gate already started the cooldown.
        assert_eq!(event_loop.gate().last_persisted_at("MH12AB3456"), Some(0.0));
    }

    #[test]
    fn test_source_failure_ends_loop() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let mut parts = parts(
            Vec::new(),
            MockPlateDetector::new(),
            ScriptedOcrEngine::new(),
            &sink,
            &clock,
        );
        parts.source = Box::new(BrokenSource);

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        assert_eq!(event_loop.run(&mut parts, &CancelFlag::new()), StopReason::EndOfStream);
        assert_eq!(event_loop.stats().frames_processed, 0);
        assert_eq!(event_loop.stats().source_failures, 1);
    }

    #[test]
    fn test_cancel_checked_after_frame() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let mut parts = parts(
            frames(5),
            MockPlateDetector::new(),
            ScriptedOcrEngine::new(),
            &sink,
            &clock,
        );
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut event_loop = FrameEventLoop::new(AnprConfig::default()).unwrap();
        assert_eq!(event_loop.run(&mut parts, &cancel), StopReason::Cancelled);
        // The frame in flight is finished before stopping.
        assert_eq!(event_loop.stats().frames_processed, 1);
    }

    #[test]
    fn test_parallel_ocr_keeps_detector_order() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let detector = MockPlateDetector::with_regions(vec![
            Region::new(0, 0, 50, 25),
            Region::new(50, 0, 100, 25),
            Region::new(0, 25, 50, 50),
        ]);
        let ocr = ScriptedOcrEngine::new().with_frame(1, plate_spans());
        let mut parts = parts(Vec::new(), detector, ocr, &sink, &clock);
        parts.renderer = Box::new(BoxRenderer::new());

        let config = AnprConfig {
            parallel_ocr: true,
            ..Default::default()
        };
        let mut event_loop = FrameEventLoop::new(config).unwrap();
        let mut frame = Frame::filled(100, 50, 0, 1);
        let outcomes = event_loop.process_frame(&mut frame, &mut parts);

        assert!(matches!(outcomes[0], RegionOutcome::Persisted { .. }));
        assert!(matches!(outcomes[1], RegionOutcome::Suppressed { .. }));
        assert!(matches!(outcomes[2], RegionOutcome::Suppressed { .. }));
        assert_eq!(sink.saved().len(), 1);
    }

    #[test]
    fn test_strict_format_skips_garbage() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let ocr = ScriptedOcrEngine::new().with_frame(1, vec![TextSpan::new("12AB3456", 0.9)]);
        let mut parts = parts(
            frames(1),
            MockPlateDetector::with_regions(vec![PLATE_BOX]),
            ocr,
            &sink,
            &clock,
        );

        let config = AnprConfig {
            strict_format: true,
            ..Default::default()
        };
        let mut event_loop = FrameEventLoop::new(config).unwrap();
        event_loop.run(&mut parts, &CancelFlag::new());

        assert!(sink.saved().is_empty());
        assert_eq!(event_loop.stats().readings, 0);
    }

    #[test]
    fn test_sweep_forgets_expired_plates() {
        let clock = ManualClock::new();
        let sink = MemorySink::new();
        let ocr = ScriptedOcrEngine::new().with_frame(1, plate_spans());
        let mut parts = parts(
            Vec::new(),
            MockPlateDetector::with_regions(vec![PLATE_BOX]),
            ocr,
            &sink,
            &clock,
        );
        parts.source = Box::new(TimedSource {
            inner: VecFrameSource::new(frames(2)),
            clock: clock.clone(),
            times: vec![0.0, 20.0],
            index: 0,
        });

        let config = AnprConfig {
            sweep_interval_frames: 2,
            ..Default::default()
        };
        let mut event_loop = FrameEventLoop::new(config).unwrap();
        event_loop.run(&mut parts, &CancelFlag::new());

        assert!(event_loop.gate().is_empty());
    }
}
