//! human_detector - person detection HTTP service
//!
//! This daemon:
//! 1. Loads configuration (.env, HUMAN_DETECTOR_CONFIG file, HUMAN_DETECTOR_* env)
//! 2. Binds the configured model to every supported device
//! 3. Serves `POST /detect` and `GET /health` until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use human_detector::{
    api::{ApiConfig, ApiServer},
    config::load_env_file,
    load_engine, Detector, DetectorConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file; environment variables override its values.
    #[arg(long, env = "HUMAN_DETECTOR_CONFIG")]
    config: Option<PathBuf>,
    /// Listen address (overrides config and HUMAN_DETECTOR_API_ADDR).
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if load_env_file(Path::new(".env"))? {
        log::info!("loaded environment from .env");
    }
    let args = Args::parse();
    let config = DetectorConfig::load_from(args.config.as_deref())?;
    log::info!(
        "model {} ({}), confidence threshold {}, default cpu threads {}",
        config.model_size,
        config.model_path().display(),
        config.confidence_threshold,
        config.cpu_threads
    );

    let detector = Detector::from_config(&config, |device| load_engine(device, &config));
    let available = detector.registry().available();
    if available.is_empty() {
        log::warn!("no device has an engine bound; every detect request will fail");
    } else {
        log::info!("available devices: {:?}", available);
    }

    let api_config = ApiConfig {
        addr: args.addr.unwrap_or_else(|| config.api_addr.clone()),
        max_body_bytes: config.max_body_bytes,
        max_connections: config.max_connections,
    };
    let api_handle = ApiServer::new(api_config, Arc::new(detector)).spawn()?;
    log::info!("detection api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("human_detector waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
