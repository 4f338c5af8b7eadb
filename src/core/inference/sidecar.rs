//! Worker-process client for the detection and OCR models.
//!
//! The worker is spawned as a child process and spoken to over stdin/stdout.
//! Every message is a frame: 4-byte big-endian length, then the payload.
//! Requests are JSON tagged by `type`; `detect` and `ocr` are followed by a
//! second frame holding the PNG-encoded image. Responses are single JSON
//! frames: `regions`, `spans`, `pong` or `error`.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{OcrEngine, TextSpan};
use crate::core::error::AnprError;
use crate::core::video::{Frame, PlateDetector, Region};

const MAX_FRAME_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SidecarConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl SidecarConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerRequest {
    Detect { request_id: u64, width: u32, height: u32 },
    Ocr { request_id: u64, width: u32, height: u32 },
    Ping,
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerResponse {
    Regions { regions: Vec<[i64; 4]> },
    Spans { spans: Vec<TextSpan> },
    Pong,
    Error { message: String },
}

/// Running child with its pipes.
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl WorkerProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn exchange(
        &mut self,
        request: &WorkerRequest,
        image: Option<&[u8]>,
    ) -> Result<WorkerResponse, AnprError> {
        write_frame(&mut self.stdin, &serde_json::to_vec(request)?)?;
        if let Some(png) = image {
            write_frame(&mut self.stdin, png)?;
        }
        self.stdin.flush()?;

        let payload = read_frame(&mut self.stdout)?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Ok(bytes) = serde_json::to_vec(&WorkerRequest::Shutdown) {
            let _ = write_frame(&mut self.stdin, &bytes);
            let _ = self.stdin.flush();
        }
        std::thread::sleep(Duration::from_millis(100));
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Model worker serving both plate detection and OCR.
///
/// Calls are serialized through one lock. A worker that died, or whose stream
/// broke mid-exchange, is respawned on the next call.
pub struct SidecarWorker {
    config: SidecarConfig,
    worker: Mutex<Option<WorkerProcess>>,
    next_request_id: AtomicU64,
}

impl SidecarWorker {
    pub fn new(config: SidecarConfig) -> Self {
        Self {
            config,
            worker: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Spawn eagerly and ping once, so a missing or mute worker fails at
    /// startup, not on frame one.
    pub fn start(config: SidecarConfig) -> Result<Self, AnprError> {
        let sidecar = Self::new(config);
        let process = sidecar.spawn_worker()?;
        *sidecar.lock_worker() = Some(process);
        if !sidecar.health_check() {
            return Err(AnprError::Worker(format!(
                "{} did not answer ping",
                sidecar.config.program
            )));
        }
        Ok(sidecar)
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<WorkerProcess>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_worker(&self) -> Result<WorkerProcess, AnprError> {
        info!("🔧 Spawning model worker: {} {:?}", self.config.program, self.config.args);

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                AnprError::Worker(format!("failed to spawn {}: {}", self.config.program, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnprError::Worker("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AnprError::Worker("worker stdout unavailable".into()))?;

        info!("✅ Model worker spawned (pid: {})", child.id());
        Ok(WorkerProcess {
            child,
            stdin,
            stdout,
        })
    }

    fn send_recv(
        &self,
        request: &WorkerRequest,
        image: Option<&[u8]>,
    ) -> Result<WorkerResponse, AnprError> {
        let mut guard = self.lock_worker();

        let needs_spawn = match guard.as_mut() {
            Some(w) => !w.is_alive(),
            None => true,
        };
        if needs_spawn {
            warn!("Model worker not running, respawning");
            *guard = Some(self.spawn_worker()?);
        }

        let worker = guard
            .as_mut()
            .ok_or_else(|| AnprError::Worker("worker not running".into()))?;

        match worker.exchange(request, image) {
            Ok(WorkerResponse::Error { message }) => Err(AnprError::Worker(message)),
            Ok(response) => Ok(response),
            Err(e) => {
                // Stream state unknown; start over next time.
                *guard = None;
                Err(e)
            }
        }
    }

    pub fn health_check(&self) -> bool {
        match self.send_recv(&WorkerRequest::Ping, None) {
            Ok(WorkerResponse::Pong) => true,
            Ok(other) => {
                warn!("Unexpected health check response: {:?}", other);
                false
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        }
    }

    fn request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl PlateDetector for SidecarWorker {
    fn detect(&self, frame: &Frame) -> Result<Vec<Region>, AnprError> {
        let png = frame.encode_png()?;
        let request = WorkerRequest::Detect {
            request_id: self.request_id(),
            width: frame.width(),
            height: frame.height(),
        };

        let start = Instant::now();
        match self.send_recv(&request, Some(&png))? {
            WorkerResponse::Regions { regions } => {
                let regions = regions_from_wire(&regions);
                debug!(
                    "Detect frame {}: {} regions in {}ms",
                    frame.frame_number,
                    regions.len(),
                    start.elapsed().as_millis()
                );
                Ok(regions)
            }
            other => Err(AnprError::Worker(format!(
                "unexpected detect response: {:?}",
                other
            ))),
        }
    }
}

impl OcrEngine for SidecarWorker {
    fn recognize(&self, region: &Frame) -> Result<Vec<TextSpan>, AnprError> {
        let png = region.encode_png()?;
        let request = WorkerRequest::Ocr {
            request_id: self.request_id(),
            width: region.width(),
            height: region.height(),
        };

        match self.send_recv(&request, Some(&png))? {
            WorkerResponse::Spans { spans } => Ok(spans),
            other => Err(AnprError::Worker(format!(
                "unexpected ocr response: {:?}",
                other
            ))),
        }
    }
}

impl Drop for SidecarWorker {
    fn drop(&mut self) {
        info!("🗑️ Model worker released");
    }
}

/// Negative coordinates clamp to 0; degenerate boxes are dropped.
fn regions_from_wire(raw: &[[i64; 4]]) -> Vec<Region> {
    raw.iter()
        .map(|&[x1, y1, x2, y2]| Region::from_signed(x1, y1, x2, y2))
        .filter(|r| !r.is_empty())
        .collect()
}

fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<(), AnprError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(AnprError::Worker(format!(
            "message too large: {}",
            payload.len()
        )));
    }
    w.write_all(&(payload.len() as u32).to_be_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

fn read_frame<R: Read>(r: &mut R) -> Result<Vec<u8>, AnprError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(AnprError::Worker(format!("message too large: {}", len)));
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}
