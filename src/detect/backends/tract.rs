#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceEngine, InferenceOptions};
use crate::detect::result::RawDetection;
use crate::detect::yolo;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based engine running an exported YOLO11 ONNX model on the CPU.
///
/// The model is loaded once from a local file; inference does no I/O.
pub struct TractEngine {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    iou_threshold: f32,
    num_classes: usize,
}

impl TractEngine {
    /// Load an ONNX model from disk with a fixed square input.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!("model file {} not found", model_path.display()));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            num_classes: yolo::COCO_CLASSES,
        })
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn run(&self, input: Vec<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let side = self.input_size as usize;
        let input: Tensor = tract_ndarray::Array4::from_shape_vec((1, 3, side, side), input)
            .context("input tensor shape mismatch")?
            .into();
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok((view.iter().copied().collect(), view.shape().to_vec()))
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        image: &RgbImage,
        options: &InferenceOptions,
    ) -> Result<Vec<RawDetection>> {
        let threads = options.threads.unwrap_or(1);
        let (input, geometry) = yolo::letterbox(image, self.input_size, threads)?;
        let (data, shape) = self.run(input)?;
        yolo::decode_output(
            &data,
            &shape,
            4 + self.num_classes,
            &geometry,
            options,
            self.iou_threshold,
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        let (input, _) = yolo::letterbox(&blank, self.input_size, 1)?;
        self.run(input).map(|_| ())
    }
}
