use inference::{BoundingBox, RawDetection};

/// Labels that count as ring defects.
pub const DEFECT_LABELS: [&str; 3] = ["breakage", "crack", "scratch"];

pub const DEFAULT_REPORT_THRESHOLD: f32 = 0.6;

/// A raw detection that passed the label allow-list and the report threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Defect {
    /// Lower-cased
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Qualifying detections, in detector order
    pub defects: Vec<Defect>,
    /// First qualifying detection, if any
    pub primary: Option<Defect>,
}

impl Evaluation {
    pub fn is_clean(&self) -> bool {
        self.primary.is_none()
    }

    pub fn max_confidence(&self) -> Option<f32> {
        self.defects
            .iter()
            .map(|d| d.confidence)
            .reduce(f32::max)
    }

    /// The single defect a frame is reported as.
    ///
    /// Label and box come from the primary (first) defect while the
    /// confidence is the highest across all defects; the two need not
    /// belong to the same detection.
    pub fn reportable(&self) -> Option<Defect> {
        let primary = self.primary.as_ref()?;
        Some(Defect {
            confidence: self.max_confidence().unwrap_or(primary.confidence),
            ..primary.clone()
        })
    }
}

/// Turns detector output into reportable defects.
#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    labels: Vec<String>,
    threshold: f32,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_THRESHOLD)
    }
}

impl DetectionPolicy {
    pub fn new(threshold: f32) -> Self {
        Self {
            labels: DEFECT_LABELS.iter().map(|l| l.to_string()).collect(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Label match is case-insensitive; the threshold is inclusive.
    pub fn qualifies(&self, detection: &RawDetection) -> bool {
        let label = detection.label.to_lowercase();
        self.labels.iter().any(|l| *l == label) && detection.confidence >= self.threshold
    }

    pub fn evaluate(&self, detections: &[RawDetection]) -> Evaluation {
        let defects: Vec<Defect> = detections
            .iter()
            .filter(|d| self.qualifies(d))
            .map(|d| Defect {
                label: d.label.to_lowercase(),
                confidence: d.confidence,
                bbox: d.bbox,
            })
            .collect();
        let primary = defects.first().cloned();

        Evaluation { defects, primary }
    }
}
