use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::{InferenceEngine, InferenceOptions};
use crate::detect::result::RawDetection;

const BLANK_TOLERANCE: u8 = 8;

/// Scripted engine for tests and dry runs.
///
/// Emits its canned detections for any frame that is not (near-)black, and
/// nothing for blank frames; the tolerance absorbs lossy codec noise.
/// Every call's options are appended to a shared log that stays readable
/// after the engine is moved into a registry.
#[derive(Clone, Debug, Default)]
pub struct StubEngine {
    detections: Vec<RawDetection>,
    fail: bool,
    calls: Arc<Mutex<Vec<InferenceOptions>>>,
}

impl StubEngine {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    /// Engine that never detects anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Engine whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Shared log of the options passed to every `detect` call.
    pub fn call_log(&self) -> Arc<Mutex<Vec<InferenceOptions>>> {
        self.calls.clone()
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        image: &RgbImage,
        options: &InferenceOptions,
    ) -> Result<Vec<RawDetection>> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("stub call log poisoned"))?
            .push(options.clone());
        if self.fail {
            return Err(anyhow!("stub engine configured to fail"));
        }
        if image.pixels().all(|p| p.0.iter().all(|&c| c <= BLANK_TOLERANCE)) {
            return Ok(Vec::new());
        }
        // Deliberately ignores the class filter and threshold.
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn options() -> InferenceOptions {
        InferenceOptions {
            confidence_threshold: 0.5,
            classes: vec![0],
            threads: Some(4),
        }
    }

    #[test]
    fn blank_frame_yields_nothing() {
        let det = RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 5.0,
            y2: 5.0,
            confidence: 0.9,
            class_id: 0,
        };
        let mut engine = StubEngine::new(vec![det.clone()]);
        let blank = RgbImage::new(10, 10);
        assert!(engine.detect(&blank, &options()).unwrap().is_empty());

        let lit = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        assert_eq!(engine.detect(&lit, &options()).unwrap(), vec![det]);
        let log = engine.call_log();
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].threads, Some(4));
    }
}
