//! Human Detector
//!
//! Serves a pretrained YOLO11 object-detection model behind an HTTP
//! endpoint and reports only "person" detections.
//!
//! # Module Structure
//!
//! - `codec`: image bytes to RGB pixels
//! - `detect`: engines, the device registry and the detection orchestrator
//! - `api`: HTTP façade (`POST /detect`, `GET /health`)
//! - `config`: file + environment configuration

pub mod api;
pub mod codec;
pub mod config;
pub mod detect;
pub mod device;
pub mod error;
pub mod model;

pub use codec::decode_image;
pub use config::DetectorConfig;
pub use detect::{
    load_engine, BoundingBox, DetectionResult, Detector, DeviceRegistry, InferenceEngine,
    InferenceOptions, RawDetection, StubEngine, PERSON_CLASS_ID,
};
pub use device::Device;
pub use error::DetectError;
pub use model::ModelSize;
