//! detect_image - run person detection on a local image file
//!
//! Uses the same configuration and orchestration path as the HTTP service
//! and prints the camelCase JSON result to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use human_detector::api::validate_cpu_threads;
use human_detector::config::load_env_file;
use human_detector::{load_engine, Detector, DetectorConfig, Device};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file (JPEG, PNG, GIF, WebP, BMP, TIFF).
    image: PathBuf,
    /// Device to run on (cpu|gpu).
    #[arg(long, default_value = "cpu")]
    device: String,
    /// CPU thread count for this run (1-64).
    #[arg(long)]
    cpu_threads: Option<i64>,
    /// JSON config file; environment variables override its values.
    #[arg(long, env = "HUMAN_DETECTOR_CONFIG")]
    config: Option<PathBuf>,
    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if load_env_file(Path::new(".env"))? {
        log::info!("loaded environment from .env");
    }
    let args = Args::parse();
    let device: Device = args.device.parse()?;
    let cpu_threads = args
        .cpu_threads
        .map(validate_cpu_threads)
        .transpose()?;

    let mut config = DetectorConfig::load_from(args.config.as_deref())?;
    // Only bind the requested device; loading the model twice is wasted work.
    config.supported_devices = vec![device];
    let detector = Detector::from_config(&config, |d| load_engine(d, &config));

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let result = detector
        .detect_bytes(&bytes, device, cpu_threads)?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
