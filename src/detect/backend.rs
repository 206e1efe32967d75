use anyhow::Result;
use image::RgbImage;

use crate::detect::result::RawDetection;

/// Per-call inference settings.
///
/// The thread count travels with the call instead of living in a
/// process-wide knob, so concurrent requests never observe each other's
/// overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceOptions {
    /// Minimum confidence a detection must reach to be emitted.
    pub confidence_threshold: f32,
    /// Class ids to keep. Empty keeps every class.
    pub classes: Vec<u32>,
    /// Worker threads for CPU engines. `None` for non-CPU devices.
    pub threads: Option<usize>,
}

/// Inference engine bound to one logical device.
///
/// Engines are opaque: given an RGB frame and the options, they return
/// zero or more detections in pixel coordinates of the input frame. The
/// order of the returned vector is preserved all the way to the caller.
pub trait InferenceEngine: Send {
    /// Engine identifier used in logs.
    fn name(&self) -> &'static str;

    /// Run detection on a decoded frame.
    fn detect(&mut self, image: &RgbImage, options: &InferenceOptions)
        -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once after the engine is bound.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
