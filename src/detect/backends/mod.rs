pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::{anyhow, Result};

use crate::config::DetectorConfig;
use crate::detect::backend::InferenceEngine;
use crate::device::Device;

pub use stub::StubEngine;

#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;

/// Bind the configured model to a logical device.
///
/// Tract executes on the CPU only, so GPU binding always fails and the
/// registry records the GPU as unavailable.
pub fn load_engine(device: Device, config: &DetectorConfig) -> Result<Box<dyn InferenceEngine>> {
    match device {
        Device::Cpu => load_cpu_engine(config),
        Device::Gpu => Err(anyhow!(
            "no GPU execution provider is compiled into this build"
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn load_cpu_engine(config: &DetectorConfig) -> Result<Box<dyn InferenceEngine>> {
    let engine = TractEngine::load(config.model_path(), config.input_size)?
        .with_iou_threshold(config.iou_threshold);
    Ok(Box::new(engine))
}

#[cfg(not(feature = "backend-tract"))]
fn load_cpu_engine(config: &DetectorConfig) -> Result<Box<dyn InferenceEngine>> {
    Err(anyhow!(
        "cannot load {}: built without an inference backend (enable feature 'backend-tract')",
        config.model_path().display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_never_binds() {
        match load_engine(Device::Gpu, &DetectorConfig::default()) {
            Ok(engine) => panic!("gpu bound to engine '{}'", engine.name()),
            Err(err) => assert!(err.to_string().contains("GPU")),
        }
    }

    #[test]
    fn missing_model_fails_cpu_binding() {
        let config = DetectorConfig {
            model_dir: "/nonexistent/models".into(),
            ..DetectorConfig::default()
        };
        assert!(load_engine(Device::Cpu, &config).is_err());
    }
}
