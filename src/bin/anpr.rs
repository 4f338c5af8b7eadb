use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use anpr_lib::api::{AnprSession, DetectorKind, SessionOptions};
use anpr_lib::core::inference::SidecarConfig;
use anpr_lib::core::AnprError;
use anpr_lib::frame_loop::{AnprConfig, CancelFlag, StopReason};
use clap::{Parser, ValueEnum};
use log::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetectorArg {
    /// Treat every frame as a plate crop.
    FullFrame,
    /// Ask the model worker for plate boxes.
    Worker,
}

/// Read plates from a stream of frames and save each sighting once per cooldown.
#[derive(Debug, Parser)]
#[command(name = "anpr", version)]
struct Args {
    /// Directory of frame images, processed in file name order.
    #[arg(long)]
    source: PathBuf,

    /// JSON5 config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for plate crops and the detection log.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Seconds before the same plate is saved again.
    #[arg(long, allow_negative_numbers = true)]
    cooldown: Option<f64>,

    /// Drop readings that do not look like a plate.
    #[arg(long)]
    strict: bool,

    /// Model worker executable.
    #[arg(long)]
    worker: String,

    /// Extra argument for the model worker; repeatable.
    #[arg(long = "worker-arg")]
    worker_args: Vec<String>,

    #[arg(long, value_enum, default_value = "worker")]
    detector: DetectorArg,

    /// Write the latest annotated frame to this file.
    #[arg(long)]
    preview: Option<PathBuf>,
}

impl Args {
    fn load_config(&self) -> Result<AnprConfig, AnprError> {
        let mut config = match &self.config {
            Some(path) => AnprConfig::load(path)?,
            None => AnprConfig::default(),
        };
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(cooldown) = self.cooldown {
            config.cooldown_secs = cooldown;
        }
        if self.strict {
            config.strict_format = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn session_options(&self) -> SessionOptions {
        let detector = match self.detector {
            DetectorArg::FullFrame => DetectorKind::FullFrame,
            DetectorArg::Worker => DetectorKind::Worker,
        };
        let mut options = SessionOptions::new(self.source.clone(), detector);
        options.worker =
            Some(SidecarConfig::new(self.worker.clone()).with_args(self.worker_args.clone()));
        options.preview_path = self.preview.clone();
        options
    }
}

/// Typing `q` on stdin stops the loop after the current frame.
fn watch_stdin(cancel: CancelFlag) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    info!("⏹️ Quit requested");
                    cancel.cancel();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}

fn run(args: &Args) -> Result<StopReason, AnprError> {
    let config = args.load_config()?;
    info!(
        "🚀 ANPR starting: source={}, output={}, cooldown={}s",
        args.source.display(),
        config.output_dir.display(),
        config.cooldown_secs
    );

    let mut session = AnprSession::open(config, args.session_options())?;
    let cancel = CancelFlag::new();
    watch_stdin(cancel.clone());

    let reason = session.run(&cancel);
    let stats = session.stats();
    info!(
        "📊 Done ({:?}): {} frames, {} readings, {} saved, {} suppressed, {} save failures, {} source failures",
        reason,
        stats.frames_processed,
        stats.readings,
        stats.persisted,
        stats.suppressed,
        stats.persist_failures,
        stats.source_failures
    );
    Ok(reason)
}

fn main() -> ExitCode {
    anpr_lib::init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
