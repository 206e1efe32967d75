//! YOLO11 tensor plumbing shared by ONNX engines.
//!
//! Preprocessing letterboxes the frame into a square `CHW` float tensor;
//! postprocessing decodes the `[1, 4 + classes, anchors]` output (or its
//! transpose), filters by class and confidence, runs per-class NMS and maps
//! boxes back into the original frame's pixel space.

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;

use crate::detect::backend::InferenceOptions;
use crate::detect::result::RawDetection;

const PAD_VALUE: f32 = 114.0 / 255.0;

/// Upper bound on preprocessing workers per frame, whatever the thread
/// budget.
pub const MAX_BAND_WORKERS: usize = 8;

/// Class count of the stock COCO-trained YOLO11 exports.
pub const COCO_CLASSES: usize = 80;

/// Geometry of a letterboxed frame, needed to undo the transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

/// Letterbox `image` into a `3 x size x size` tensor normalized to [0, 1].
///
/// The pixel copy is split into row bands across at most `threads` scoped
/// workers, capped at [`MAX_BAND_WORKERS`].
pub fn letterbox(image: &RgbImage, size: u32, threads: usize) -> Result<(Vec<f32>, Letterbox)> {
    let (orig_w, orig_h) = image.dimensions();
    if orig_w == 0 || orig_h == 0 || size == 0 {
        return Err(anyhow!("cannot letterbox a {}x{} frame", orig_w, orig_h));
    }

    let scale = (size as f32 / orig_w as f32).min(size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;
    let offset = (pad_x.floor() as usize, pad_y.floor() as usize);

    let side = size as usize;
    let plane = side * side;
    let mut tensor = vec![PAD_VALUE; plane * 3];
    {
        let (red, rest) = tensor.split_at_mut(plane);
        let (green, blue) = rest.split_at_mut(plane);
        let threads = band_workers(threads, side);
        let rows_per_band = side.div_ceil(threads);
        let band_len = rows_per_band * side;

        if threads == 1 {
            fill_band(red, green, blue, 0, side, &resized, offset);
        } else {
            std::thread::scope(|scope| {
                let bands = red
                    .chunks_mut(band_len)
                    .zip(green.chunks_mut(band_len))
                    .zip(blue.chunks_mut(band_len))
                    .enumerate();
                for (index, ((r, g), b)) in bands {
                    let resized = &resized;
                    scope.spawn(move || {
                        fill_band(r, g, b, index * rows_per_band, side, resized, offset)
                    });
                }
            });
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
            orig_width: orig_w,
            orig_height: orig_h,
        },
    ))
}

/// Number of row bands a frame of `side` rows is split into.
pub fn band_workers(threads: usize, side: usize) -> usize {
    threads.min(MAX_BAND_WORKERS).clamp(1, side.max(1))
}

fn fill_band(
    red: &mut [f32],
    green: &mut [f32],
    blue: &mut [f32],
    first_row: usize,
    side: usize,
    resized: &RgbImage,
    (offset_x, offset_y): (usize, usize),
) {
    let src_w = resized.width() as usize;
    let src_h = resized.height() as usize;
    let raw = resized.as_raw();
    let rows = red.len() / side;
    for local_y in 0..rows {
        let y = first_row + local_y;
        if y < offset_y || y >= offset_y + src_h {
            continue;
        }
        let src_row = (y - offset_y) * src_w * 3;
        let dst_row = local_y * side + offset_x;
        for x in 0..src_w.min(side - offset_x) {
            let src = src_row + x * 3;
            red[dst_row + x] = raw[src] as f32 / 255.0;
            green[dst_row + x] = raw[src + 1] as f32 / 255.0;
            blue[dst_row + x] = raw[src + 2] as f32 / 255.0;
        }
    }
}

/// Decode raw model output into detections in original-frame pixels.
///
/// `features` is the model's per-anchor width, `4 + classes`. `shape` must
/// be `[1, features, anchors]` (the usual export layout, preferred when both
/// axes match) or its transpose `[1, anchors, features]`.
pub fn decode_output(
    data: &[f32],
    shape: &[usize],
    features: usize,
    letterbox: &Letterbox,
    options: &InferenceOptions,
    iou_threshold: f32,
) -> Result<Vec<RawDetection>> {
    if features < 5 {
        return Err(anyhow!("output needs at least 5 features, got {}", features));
    }
    if shape.len() != 3 || shape[0] != 1 {
        return Err(anyhow!(
            "expected output shape [1, {}, anchors], got {:?}",
            features,
            shape
        ));
    }
    let features_first = if shape[1] == features {
        true
    } else if shape[2] == features {
        false
    } else {
        return Err(anyhow!(
            "output shape {:?} has no axis of {} features",
            shape,
            features
        ));
    };
    let anchors = if features_first { shape[2] } else { shape[1] };
    if data.len() != features * anchors {
        return Err(anyhow!(
            "output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            features * anchors
        ));
    }

    let at = |anchor: usize, feature: usize| -> f32 {
        if features_first {
            data[feature * anchors + anchor]
        } else {
            data[anchor * features + feature]
        }
    };
    let num_classes = features - 4;
    let max_w = letterbox.orig_width as f32;
    let max_h = letterbox.orig_height as f32;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let best = (0..num_classes)
            .filter(|&class| options.classes.is_empty() || options.classes.contains(&(class as u32)))
            .map(|class| (class, at(anchor, 4 + class)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((class, score)) = best else {
            continue;
        };
        if !score.is_finite() || score < options.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
        let unmap_x = |v: f32| ((v - letterbox.pad_x) / letterbox.scale).clamp(0.0, max_w);
        let unmap_y = |v: f32| ((v - letterbox.pad_y) / letterbox.scale).clamp(0.0, max_h);
        candidates.push(RawDetection {
            x1: unmap_x(cx - w / 2.0),
            y1: unmap_y(cy - h / 2.0),
            x2: unmap_x(cx + w / 2.0),
            y2: unmap_y(cy + h / 2.0),
            confidence: score.min(1.0),
            class_id: class as u32,
        });
    }

    Ok(non_max_suppression(candidates, iou_threshold))
}

/// Class-aware greedy NMS. Output is ordered by descending confidence.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len().min(100));
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    let intersection = if x2 > x1 && y2 > y1 {
        (x2 - x1) * (y2 - y1)
    } else {
        0.0
    };
    let area = |d: &RawDetection| (d.x2 - d.x1).max(0.0) * (d.y2 - d.y1).max(0.0);
    let union = area(a) + area(b) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
