mod backend;
pub mod backends;
mod orchestrator;
mod registry;
mod result;
pub mod yolo;

pub use backend::{InferenceEngine, InferenceOptions};
pub use backends::{load_engine, StubEngine};
pub use orchestrator::Detector;
pub use registry::{DeviceRegistry, EngineHandle};
pub use result::{BoundingBox, DetectionResult, RawDetection, PERSON_CLASS_ID};

#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
