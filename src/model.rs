use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// YOLO11 model variant to load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelSize {
    #[default]
    Nano,
    Small,
    Medium,
    Large,
    XLarge,
}

impl ModelSize {
    pub fn file_name(self) -> &'static str {
        match self {
            ModelSize::Nano => "yolo11n.onnx",
            ModelSize::Small => "yolo11s.onnx",
            ModelSize::Medium => "yolo11m.onnx",
            ModelSize::Large => "yolo11l.onnx",
            ModelSize::XLarge => "yolo11x.onnx",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelSize::Nano => "nano",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
            ModelSize::XLarge => "xlarge",
        }
    }

    pub fn model_path(self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.file_name())
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSize {
    type Err = anyhow::Error;

    /// Accepts the long name, the single-letter suffix, or the model file
    /// stem/name (`nano`, `n`, `yolo11n`, `yolo11n.onnx`, `yolo11n.pt`).
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let stem = lowered
            .trim_end_matches(".onnx")
            .trim_end_matches(".pt")
            .trim_start_matches("yolo11");
        match stem {
            "nano" | "n" => Ok(ModelSize::Nano),
            "small" | "s" => Ok(ModelSize::Small),
            "medium" | "m" => Ok(ModelSize::Medium),
            "large" | "l" => Ok(ModelSize::Large),
            "xlarge" | "x" => Ok(ModelSize::XLarge),
            _ => Err(anyhow!(
                "unknown model size '{}' (expected nano, small, medium, large or xlarge)",
                s
            )),
        }
    }
}

impl TryFrom<String> for ModelSize {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelSize> for String {
    fn from(value: ModelSize) -> Self {
        value.as_str().to_string()
    }
}
