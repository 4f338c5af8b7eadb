use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Persistence timestamp layout, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Time source for the frame loop.
///
/// `now_secs` is monotonic and drives the dedup cooldown; `timestamp` is wall
/// clock and only names persisted artifacts.
pub trait Clock: Send {
    fn now_secs(&self) -> f64;
    fn timestamp(&self) -> String;
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn timestamp(&self) -> String {
        Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one
/// handle and move another into the loop.
#[derive(Clone)]
pub struct ManualClock {
    secs: Arc<Mutex<f64>>,
    epoch: NaiveDateTime,
}

impl ManualClock {
    pub fn new() -> Self {
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            secs: Arc::new(Mutex::new(0.0)),
            epoch,
        }
    }

    pub fn set(&self, secs: f64) {
        *self.secs.lock().unwrap_or_else(|e| e.into_inner()) = secs;
    }

    pub fn advance(&self, secs: f64) {
        *self.secs.lock().unwrap_or_else(|e| e.into_inner()) += secs;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.secs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timestamp(&self) -> String {
        let offset = Duration::from_secs_f64(self.now_secs().max(0.0));
        let delta = chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero());
        (self.epoch + delta).format(TIMESTAMP_FORMAT).to_string()
    }
}
