use thiserror::Error;

use crate::device::Device;

/// Errors surfaced to callers of the detection pipeline.
///
/// None of these are retried internally. Messages name the offending field
/// or value and, for device errors, the devices that can be used instead.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("device '{device}' is not supported. Available devices: {}", format_devices(.available))]
    UnsupportedDevice {
        device: Device,
        available: Vec<Device>,
    },

    #[error("device '{device}' requested but not available in this environment. Available devices: {}", format_devices(.available))]
    DeviceUnavailable {
        device: Device,
        available: Vec<Device>,
    },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("inference failed: {0}")]
    Inference(String),
}

impl DetectError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Short machine-readable kind used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::UnsupportedDevice { .. } => "unsupported_device",
            Self::DeviceUnavailable { .. } => "device_unavailable",
            Self::Validation { .. } => "validation_error",
            Self::Inference(_) => "inference_error",
        }
    }
}

fn format_devices(devices: &[Device]) -> String {
    let names: Vec<&str> = devices.iter().map(|d| d.as_str()).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_list_alternatives() {
        let err = DetectError::DeviceUnavailable {
            device: Device::Gpu,
            available: vec![Device::Cpu],
        };
        let msg = err.to_string();
        assert!(msg.contains("'gpu'"));
        assert!(msg.ends_with("Available devices: [cpu]"));
        assert_eq!(err.kind(), "device_unavailable");
    }

    #[test]
    fn validation_error_names_field() {
        let err = DetectError::validation("cpuThreads", "must be between 1 and 64, got 0");
        assert_eq!(
            err.to_string(),
            "invalid cpuThreads: must be between 1 and 64, got 0"
        );
    }
}
