use image::RgbImage;

use crate::codec::decode_image;
use crate::config::DetectorConfig;
use crate::device::Device;
use crate::error::DetectError;

use super::backend::{InferenceEngine, InferenceOptions};
use super::registry::{DeviceRegistry, EngineHandle};
use super::result::{BoundingBox, DetectionResult, PERSON_CLASS_ID};

/// Person detection over a fixed device registry.
///
/// Shareable across threads. Calls on the same device serialize on that
/// device's engine lock; calls on different devices run independently.
pub struct Detector {
    registry: DeviceRegistry,
    confidence_threshold: f32,
    default_cpu_threads: usize,
}

impl Detector {
    pub fn new(registry: DeviceRegistry, confidence_threshold: f32, default_cpu_threads: usize) -> Self {
        Self {
            registry,
            confidence_threshold,
            default_cpu_threads,
        }
    }

    /// Bind engines for every supported device using `loader`.
    pub fn from_config<F>(config: &DetectorConfig, loader: F) -> Self
    where
        F: FnMut(Device) -> anyhow::Result<Box<dyn InferenceEngine>>,
    {
        let registry = DeviceRegistry::initialize(&config.supported_devices, loader);
        Self::new(registry, config.confidence_threshold, config.cpu_threads)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Decode `bytes` and run [`Detector::detect`] on the result.
    ///
    /// The device is checked before decoding, so an unusable device is
    /// reported even when the payload is also bad.
    pub fn detect_bytes(
        &self,
        bytes: &[u8],
        device: Device,
        thread_override: Option<usize>,
    ) -> Result<DetectionResult, DetectError> {
        self.engine_for(device)?;
        let pixels = decode_image(bytes)?;
        self.detect(&pixels, device, thread_override)
    }

    /// Run person detection on decoded pixels.
    ///
    /// `thread_override` applies to this call only and only on the CPU; it
    /// is ignored for other devices. Boxes keep the engine's emission order.
    pub fn detect(
        &self,
        pixels: &RgbImage,
        device: Device,
        thread_override: Option<usize>,
    ) -> Result<DetectionResult, DetectError> {
        let engine = self.engine_for(device)?;

        let options = InferenceOptions {
            confidence_threshold: self.confidence_threshold,
            classes: vec![PERSON_CLASS_ID],
            threads: match device {
                Device::Cpu => Some(thread_override.unwrap_or(self.default_cpu_threads)),
                Device::Gpu => None,
            },
        };

        let raw = {
            let mut guard = engine
                .lock()
                .map_err(|_| DetectError::Inference(format!("{} engine lock poisoned", device)))?;
            guard
                .detect(pixels, &options)
                .map_err(|e| DetectError::Inference(format!("{:#}", e)))?
        };

        let boxes: Vec<BoundingBox> = raw
            .into_iter()
            .filter(|d| d.class_id == PERSON_CLASS_ID)
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.confidence_threshold)
            .map(|d| BoundingBox {
                x1: d.x1,
                y1: d.y1,
                x2: d.x2,
                y2: d.y2,
                confidence: d.confidence.clamp(0.0, 1.0),
            })
            .collect();

        let result = DetectionResult::from_boxes(boxes);
        log::debug!(
            "device {}: {} person(s), max confidence {:.3}",
            device,
            result.bounding_boxes.len(),
            result.max_confidence
        );
        Ok(result)
    }

    fn engine_for(&self, device: Device) -> Result<EngineHandle, DetectError> {
        if !self.registry.is_supported(device) {
            return Err(DetectError::UnsupportedDevice {
                device,
                available: self.registry.available(),
            });
        }
        self.registry
            .resolve(device)
            .ok_or_else(|| DetectError::DeviceUnavailable {
                device,
                available: self.registry.available(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubEngine;
    use crate::detect::result::RawDetection;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn raw(x1: f32, confidence: f32, class_id: u32) -> RawDetection {
        RawDetection {
            x1,
            y1: 10.0,
            x2: x1 + 50.0,
            y2: 90.0,
            confidence,
            class_id,
        }
    }

    fn lit_frame() -> RgbImage {
        RgbImage::from_pixel(100, 100, Rgb([120, 130, 140]))
    }

    fn detector_with(engine: StubEngine, supported: &[Device], bound: &[Device]) -> Detector {
        let engines = bound
            .iter()
            .map(|&d| (d, Box::new(engine.clone()) as Box<dyn InferenceEngine>))
            .collect();
        Detector::new(DeviceRegistry::from_engines(supported, engines), 0.5, 32)
    }

    #[test]
    fn filters_class_and_threshold_preserving_order() {
        let engine = StubEngine::new(vec![
            raw(0.0, 0.7, 0),
            raw(10.0, 0.95, 2),
            raw(20.0, 0.4, 0),
            raw(30.0, 0.9, 0),
            raw(40.0, 0.5, 0),
        ]);
        let detector = detector_with(engine, &[Device::Cpu], &[Device::Cpu]);
        let result = detector.detect(&lit_frame(), Device::Cpu, None).unwrap();

        let xs: Vec<f32> = result.bounding_boxes.iter().map(|b| b.x1).collect();
        assert_eq!(xs, vec![0.0, 30.0, 40.0]);
        assert!(result.human_detected);
        assert_eq!(result.max_confidence, 0.9);
        assert!(result.bounding_boxes.iter().all(|b| b.confidence >= 0.5));
    }

    fn detector_at(threshold: f32, engine: StubEngine) -> Detector {
        let engines = vec![(Device::Cpu, Box::new(engine) as Box<dyn InferenceEngine>)];
        Detector::new(DeviceRegistry::from_engines(&[Device::Cpu], engines), threshold, 32)
    }

    #[test]
    fn zero_threshold_keeps_zero_confidence_person() {
        let engine = StubEngine::new(vec![raw(0.0, 0.0, 0), raw(10.0, 0.0, 3)]);
        let result = detector_at(0.0, engine)
            .detect(&lit_frame(), Device::Cpu, None)
            .unwrap();

        assert!(result.human_detected);
        assert_eq!(result.bounding_boxes.len(), 1);
        assert_eq!(result.max_confidence, 0.0);
    }

    #[test]
    fn every_box_meets_threshold() {
        let confidences = [0.0, 0.1, 0.25, 0.5, 0.9, 0.95, 1.0, 1.3];
        let raws: Vec<RawDetection> = confidences
            .iter()
            .enumerate()
            .map(|(i, &c)| raw(i as f32 * 10.0, c, 0))
            .collect();

        for threshold in [0.0, 0.25, 0.9, 1.0] {
            let result = detector_at(threshold, StubEngine::new(raws.clone()))
                .detect(&lit_frame(), Device::Cpu, None)
                .unwrap();

            let expected = confidences.iter().filter(|&&c| c >= threshold).count();
            assert_eq!(result.bounding_boxes.len(), expected, "threshold {threshold}");
            assert_eq!(result.human_detected, expected > 0);
            for b in &result.bounding_boxes {
                assert!(b.confidence >= threshold, "threshold {threshold}: {b:?}");
                assert!(b.confidence <= 1.0);
            }
            let max = result
                .bounding_boxes
                .iter()
                .map(|b| b.confidence)
                .fold(0.0, f32::max);
            assert_eq!(result.max_confidence, max);
        }
    }

    #[test]
    fn blank_frame_yields_empty_result() {
        let engine = StubEngine::new(vec![raw(0.0, 0.9, 0)]);
        let detector = detector_with(engine, &[Device::Cpu], &[Device::Cpu]);

        let mut png = Cursor::new(Vec::new());
        RgbImage::new(100, 100).write_to(&mut png, ImageFormat::Png).unwrap();
        let result = detector
            .detect_bytes(png.get_ref(), Device::Cpu, None)
            .unwrap();

        assert!(!result.human_detected);
        assert!(result.bounding_boxes.is_empty());
        assert_eq!(result.max_confidence, 0.0);
    }

    #[test]
    fn unsupported_device_names_alternatives() {
        let detector = detector_with(StubEngine::empty(), &[Device::Cpu], &[Device::Cpu]);
        let err = detector.detect(&lit_frame(), Device::Gpu, None).unwrap_err();
        match err {
            DetectError::UnsupportedDevice { device, available } => {
                assert_eq!(device, Device::Gpu);
                assert_eq!(available, vec![Device::Cpu]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unbound_device_is_unavailable() {
        let detector = detector_with(StubEngine::empty(), &Device::ALL, &[Device::Cpu]);
        let err = detector.detect(&lit_frame(), Device::Gpu, None).unwrap_err();
        assert!(matches!(err, DetectError::DeviceUnavailable { .. }));
        assert!(err.to_string().contains("Available devices: [cpu]"));
    }

    #[test]
    fn device_checked_before_decoding() {
        let detector = detector_with(StubEngine::empty(), &Device::ALL, &[Device::Cpu]);
        let err = detector
            .detect_bytes(b"not an image", Device::Gpu, None)
            .unwrap_err();
        assert!(matches!(err, DetectError::DeviceUnavailable { .. }));

        let err = detector
            .detect_bytes(b"not an image", Device::Cpu, None)
            .unwrap_err();
        assert!(matches!(err, DetectError::Decode(_)));
    }

    #[test]
    fn thread_override_is_per_call_and_cpu_only() {
        let engine = StubEngine::empty();
        let log = engine.call_log();
        let detector = detector_with(engine, &Device::ALL, &Device::ALL);

        detector.detect(&lit_frame(), Device::Cpu, Some(4)).unwrap();
        detector.detect(&lit_frame(), Device::Cpu, None).unwrap();
        detector.detect(&lit_frame(), Device::Gpu, Some(8)).unwrap();

        let log = log.lock().unwrap();
        let threads: Vec<Option<usize>> = log.iter().map(|o| o.threads).collect();
        assert_eq!(threads, vec![Some(4), Some(32), None]);
        assert!(log.iter().all(|o| o.classes == vec![PERSON_CLASS_ID]));
        assert!(log.iter().all(|o| o.confidence_threshold == 0.5));
    }

    #[test]
    fn engine_failure_surfaces_as_inference_error() {
        let detector = detector_with(StubEngine::failing(), &[Device::Cpu], &[Device::Cpu]);
        let err = detector.detect(&lit_frame(), Device::Cpu, Some(2)).unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));

        // The failed call leaves nothing behind for the next one.
        let err = detector.detect(&lit_frame(), Device::Cpu, None).unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));
    }

    #[test]
    fn concurrent_overrides_do_not_interfere() {
        let engine = StubEngine::empty();
        let log = engine.call_log();
        let detector = std::sync::Arc::new(detector_with(engine, &[Device::Cpu], &[Device::Cpu]));

        let handles: Vec<_> = (1..=8)
            .map(|threads| {
                let detector = detector.clone();
                std::thread::spawn(move || {
                    detector
                        .detect(&lit_frame(), Device::Cpu, Some(threads))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen: Vec<usize> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|o| o.threads)
            .collect();
        seen.sort();
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
    }
}
