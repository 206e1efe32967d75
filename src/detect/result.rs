use serde::Serialize;

/// Class id of "person" in the COCO label set the YOLO models are trained on.
pub const PERSON_CLASS_ID: u32 = 0;

/// Raw engine output, before target-class filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

/// Person box in pixel coordinates of the original image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub human_detected: bool,
    pub bounding_boxes: Vec<BoundingBox>,
    pub max_confidence: f32,
}

impl DetectionResult {
    /// Build a result from boxes in emission order.
    pub fn from_boxes(bounding_boxes: Vec<BoundingBox>) -> Self {
        let max_confidence = bounding_boxes
            .iter()
            .map(|b| b.confidence)
            .fold(0.0_f32, f32::max);
        Self {
            human_detected: !bounding_boxes.is_empty(),
            bounding_boxes,
            max_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(confidence: f32) -> BoundingBox {
        BoundingBox {
            x1: 1.0,
            y1: 2.0,
            x2: 3.0,
            y2: 4.0,
            confidence,
        }
    }

    #[test]
    fn empty_result_has_zero_confidence() {
        let result = DetectionResult::from_boxes(vec![]);
        assert!(!result.human_detected);
        assert_eq!(result.max_confidence, 0.0);
    }

    #[test]
    fn max_confidence_spans_all_boxes() {
        let result = DetectionResult::from_boxes(vec![bbox(0.6), bbox(0.9), bbox(0.7)]);
        assert!(result.human_detected);
        assert_eq!(result.max_confidence, 0.9);
        assert_eq!(result.bounding_boxes[0].confidence, 0.6);
    }

    #[test]
    fn serializes_camel_case() {
        let result = DetectionResult::from_boxes(vec![bbox(0.75)]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["humanDetected"], true);
        assert_eq!(json["maxConfidence"], 0.75);
        assert_eq!(json["boundingBoxes"][0]["x2"], 3.0);
        assert_eq!(json["boundingBoxes"][0]["confidence"], 0.75);
    }
}
