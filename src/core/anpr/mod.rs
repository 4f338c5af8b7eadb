//! 车牌识别核心 - text normalization and duplicate suppression.

pub mod clock;
pub mod dedup;
pub mod normalizer;

pub use clock::{Clock, ManualClock, SystemClock, TIMESTAMP_FORMAT};
pub use dedup::{DedupDecision, DedupGate, DedupReason};
pub use normalizer::{
    FallbackPolicy, PlateFormat, PlateReading, TextNormalizer, DEFAULT_PLATE_PATTERN,
};
