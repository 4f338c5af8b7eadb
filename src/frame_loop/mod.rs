//! 逐帧处理循环 - per-frame orchestration of detection, OCR, dedup and
//! persistence.

pub mod cancel;
pub mod config;
pub mod pipeline;

pub use cancel::CancelFlag;
pub use config::AnprConfig;
pub use pipeline::{Collaborators, FrameEventLoop, LoopStats, RegionOutcome, StopReason};
