use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::device::Device;
use crate::model::ModelSize;

pub const CPU_THREADS_MIN: usize = 1;
pub const CPU_THREADS_MAX: usize = 64;
pub const CPU_THREADS_DEFAULT: usize = 32;

const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_size: Option<ModelSize>,
    model_dir: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
    supported_devices: Option<Vec<Device>>,
    cpu_threads: Option<usize>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_body_bytes: Option<usize>,
    max_connections: Option<usize>,
}

/// Service configuration: optional JSON file, then `HUMAN_DETECTOR_*`
/// environment overrides, then validation.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_size: ModelSize,
    pub model_dir: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub supported_devices: Vec<Device>,
    pub cpu_threads: usize,
    pub api_addr: String,
    pub max_body_bytes: usize,
    pub max_connections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_size: ModelSize::default(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            supported_devices: Device::ALL.to_vec(),
            cpu_threads: CPU_THREADS_DEFAULT,
            api_addr: DEFAULT_API_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl DetectorConfig {
    pub fn load() -> Result<Self> {
        let config_path = env_nonempty("HUMAN_DETECTOR_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like [`DetectorConfig::load`] with an explicit config file path.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Path of the ONNX model selected by `model_size` inside `model_dir`.
    pub fn model_path(&self) -> PathBuf {
        self.model_size.model_path(&self.model_dir)
    }

    fn from_file(file: DetectorConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            model_size: file.model_size.unwrap_or(defaults.model_size),
            model_dir: file.model_dir.unwrap_or(defaults.model_dir),
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            iou_threshold: file.iou_threshold.unwrap_or(defaults.iou_threshold),
            input_size: file.input_size.unwrap_or(defaults.input_size),
            supported_devices: file
                .supported_devices
                .unwrap_or(defaults.supported_devices),
            cpu_threads: file.cpu_threads.unwrap_or(defaults.cpu_threads),
            api_addr: file
                .api
                .as_ref()
                .and_then(|api| api.addr.clone())
                .unwrap_or(defaults.api_addr),
            max_body_bytes: file
                .api
                .as_ref()
                .and_then(|api| api.max_body_bytes)
                .unwrap_or(defaults.max_body_bytes),
            max_connections: file
                .api
                .and_then(|api| api.max_connections)
                .unwrap_or(defaults.max_connections),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(size) = env_nonempty("HUMAN_DETECTOR_MODEL_SIZE") {
            self.model_size = size.parse()?;
        }
        if let Some(dir) = env_nonempty("HUMAN_DETECTOR_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = value.trim().parse().map_err(|_| {
                anyhow!("HUMAN_DETECTOR_CONFIDENCE_THRESHOLD must be a number, got '{}'", value)
            })?;
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_IOU_THRESHOLD") {
            self.iou_threshold = value.trim().parse().map_err(|_| {
                anyhow!("HUMAN_DETECTOR_IOU_THRESHOLD must be a number, got '{}'", value)
            })?;
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_INPUT_SIZE") {
            self.input_size = value.trim().parse().map_err(|_| {
                anyhow!("HUMAN_DETECTOR_INPUT_SIZE must be an integer, got '{}'", value)
            })?;
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_SUPPORTED_DEVICES") {
            self.supported_devices = split_csv(&value)
                .iter()
                .map(|entry| entry.parse())
                .collect::<Result<Vec<Device>>>()?;
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_CPU_THREADS") {
            self.cpu_threads = value.trim().parse().map_err(|_| {
                anyhow!("HUMAN_DETECTOR_CPU_THREADS must be an integer, got '{}'", value)
            })?;
        }
        if let Some(addr) = env_nonempty("HUMAN_DETECTOR_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_MAX_BODY_BYTES") {
            self.max_body_bytes = value.trim().parse().map_err(|_| {
                anyhow!("HUMAN_DETECTOR_MAX_BODY_BYTES must be an integer number of bytes")
            })?;
        }
        if let Some(value) = env_nonempty("HUMAN_DETECTOR_MAX_CONNECTIONS") {
            self.max_connections = value.trim().parse().map_err(|_| {
                anyhow!("HUMAN_DETECTOR_MAX_CONNECTIONS must be an integer, got '{}'", value)
            })?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be between 0 and 1, got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(anyhow!(
                "iou_threshold must be between 0 and 1, got {}",
                self.iou_threshold
            ));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(anyhow!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            ));
        }
        if !(CPU_THREADS_MIN..=CPU_THREADS_MAX).contains(&self.cpu_threads) {
            return Err(anyhow!(
                "cpu_threads must be between {} and {}, got {}",
                CPU_THREADS_MIN,
                CPU_THREADS_MAX,
                self.cpu_threads
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than zero"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than zero"));
        }

        self.supported_devices.sort();
        self.supported_devices.dedup();
        if self.supported_devices.is_empty() {
            return Err(anyhow!("supported_devices must name at least one device"));
        }
        Ok(())
    }
}

/// Load `KEY=value` lines from an env file into the process environment.
///
/// Variables already set win over the file. A missing file is not an error;
/// returns whether the file was read.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(anyhow!("invalid env file {}: {}", path.display(), err)),
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
