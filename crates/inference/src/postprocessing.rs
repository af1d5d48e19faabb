use crate::{
    config::DetectorConfig,
    detection::{BoundingBox, RawDetection},
    error::DetectorError,
    preprocessing::TransformParams,
};
use ndarray::ArrayViewD;

/// Decodes raw YOLOv8 output (`[1, 4 + classes, anchors]`, boxes as
/// centre/size in input pixels) into labelled detections.
pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub class_names: Vec<String>,
}

struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: BoundingBox,
}

impl PostProcessor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            class_names: config.class_names.clone(),
        }
    }

    fn label(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    /// Returns detections ordered by descending confidence, after per-class NMS.
    #[tracing::instrument(skip_all)]
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(DetectorError::Output(format!(
                "expected [1, 4 + classes, anchors], got {:?}",
                shape
            )));
        }
        let num_classes = shape[1] - 4;
        let num_anchors = shape[2];

        let mut candidates = Vec::new();
        for i in 0..num_anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < self.confidence_threshold {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let (x1, y1) = transform.to_original(cx - w / 2.0, cy - h / 2.0);
            let (x2, y2) = transform.to_original(cx + w / 2.0, cy + h / 2.0);

            candidates.push(Candidate {
                class_id: best_class,
                confidence: best_score,
                bbox: BoundingBox::from_corners(x1, y1, x2, y2),
            });
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            if kept.len() >= self.max_detections {
                break;
            }
            let suppressed = kept.iter().any(|k| {
                k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > self.iou_threshold
            });
            if !suppressed {
                kept.push(candidate);
            }
        }

        tracing::trace!(count = kept.len(), "Detections after NMS");

        Ok(kept
            .into_iter()
            .map(|c| RawDetection::new(self.label(c.class_id), c.confidence, c.bbox))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn identity_transform(size: u32) -> TransformParams {
        TransformParams {
            orig_width: size,
            orig_height: size,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    fn test_postprocessor() -> PostProcessor {
        PostProcessor::new(&DetectorConfig::default())
    }

    /// Builds a `[1, 4 + classes, n]` tensor from (cxcywh, class scores) rows.
    fn yolo_output(rows: &[([f32; 4], Vec<f32>)]) -> Array<f32, IxDyn> {
        let n = rows.len();
        let channels = 4 + rows[0].1.len();
        let mut out = Array::zeros(IxDyn(&[1, channels, n]));
        for (i, (bbox, scores)) in rows.iter().enumerate() {
            for (k, v) in bbox.iter().enumerate() {
                out[[0, k, i]] = *v;
            }
            for (c, s) in scores.iter().enumerate() {
                out[[0, 4 + c, i]] = *s;
            }
        }
        out
    }

    #[test]
    fn test_threshold_and_labels() {
        let output = yolo_output(&[
            ([100.0, 100.0, 20.0, 40.0], vec![0.1, 0.9, 0.2]),
            ([300.0, 300.0, 20.0, 20.0], vec![0.3, 0.2, 0.1]),
        ]);

        let detections = test_postprocessor()
            .parse_detections(&output.view(), &identity_transform(640))
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "crack");
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(detections[0].bbox, BoundingBox::new(90.0, 80.0, 20.0, 40.0));
    }

    #[test]
    fn test_overlapping_same_class_is_suppressed() {
        let output = yolo_output(&[
            ([100.0, 100.0, 40.0, 40.0], vec![0.7, 0.0, 0.0]),
            ([102.0, 100.0, 40.0, 40.0], vec![0.95, 0.0, 0.0]),
            ([400.0, 400.0, 40.0, 40.0], vec![0.6, 0.0, 0.0]),
        ]);

        let detections = test_postprocessor()
            .parse_detections(&output.view(), &identity_transform(640))
            .unwrap();

        let confidences: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.6]);
        assert!(detections.iter().all(|d| d.label == "breakage"));
    }

    #[test]
    fn test_overlapping_different_classes_are_kept() {
        let output = yolo_output(&[
            ([100.0, 100.0, 40.0, 40.0], vec![0.8, 0.0, 0.0]),
            ([100.0, 100.0, 40.0, 40.0], vec![0.0, 0.0, 0.75]),
        ]);

        let detections = test_postprocessor()
            .parse_detections(&output.view(), &identity_transform(640))
            .unwrap();

        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["breakage", "scratch"]);
    }

    #[test]
    fn test_unknown_class_index_gets_generic_label() {
        let mut post = test_postprocessor();
        post.class_names.truncate(1);
        let output = yolo_output(&[([50.0, 50.0, 10.0, 10.0], vec![0.0, 0.99])]);

        let detections = post
            .parse_detections(&output.view(), &identity_transform(640))
            .unwrap();

        assert_eq!(detections[0].label, "class_1");
    }

    #[test]
    fn test_letterbox_is_undone() {
        // 1280x640 original letterboxed into 640: scale 0.5, 160px top padding
        let transform = TransformParams {
            orig_width: 1280,
            orig_height: 640,
            scale: 0.5,
            offset_x: 0.0,
            offset_y: 160.0,
        };
        let output = yolo_output(&[([320.0, 320.0, 100.0, 50.0], vec![0.0, 0.9, 0.0])]);

        let detections = test_postprocessor()
            .parse_detections(&output.view(), &transform)
            .unwrap();

        assert_eq!(
            detections[0].bbox,
            BoundingBox::new(540.0, 270.0, 200.0, 100.0)
        );
    }

    #[test]
    fn test_max_detections_cap() {
        let mut post = test_postprocessor();
        post.max_detections = 2;
        let rows: Vec<_> = (0..5)
            .map(|i| ([50.0 + 100.0 * i as f32, 50.0, 10.0, 10.0], vec![0.9, 0.0, 0.0]))
            .collect();
        let output = yolo_output(&rows);

        let detections = post
            .parse_detections(&output.view(), &identity_transform(640))
            .unwrap();
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn test_rejects_unexpected_shape() {
        let output = Array::<f32, _>::zeros(IxDyn(&[1, 4, 10]));
        assert!(matches!(
            test_postprocessor().parse_detections(&output.view(), &identity_transform(640)),
            Err(DetectorError::Output(_))
        ));

        let output = Array::<f32, _>::zeros(IxDyn(&[2, 7, 10]));
        assert!(
            test_postprocessor()
                .parse_detections(&output.view(), &identity_transform(640))
                .is_err()
        );
    }
}
