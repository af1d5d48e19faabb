use crate::policy::Defect;
use reporter::StatsSummary;
use std::collections::BTreeMap;

/// Running aggregates for the current session. No per-frame history is kept.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    total_captures: u64,
    total_defects: u64,
    clean_images: u64,
    dropped_frames: u64,
    defects_by_type: BTreeMap<String, u64>,
    avg_confidence: f64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one inspected frame and the defect it was reported as.
    pub fn record(&mut self, defect: Option<&Defect>) {
        self.total_captures += 1;

        let Some(defect) = defect else {
            self.clean_images += 1;
            return;
        };

        self.total_defects += 1;
        *self.defects_by_type.entry(defect.label.clone()).or_insert(0) += 1;
        self.avg_confidence +=
            (defect.confidence as f64 - self.avg_confidence) / self.total_defects as f64;
    }

    /// A frame that was acquired but could not be inspected.
    pub fn record_dropped(&mut self) {
        self.dropped_frames += 1;
    }

    pub fn total_captures(&self) -> u64 {
        self.total_captures
    }

    pub fn total_defects(&self) -> u64 {
        self.total_defects
    }

    pub fn snapshot(&self) -> StatsSummary {
        StatsSummary {
            total_captures: self.total_captures,
            total_defects: self.total_defects,
            clean_images: self.clean_images,
            dropped_frames: self.dropped_frames,
            defects_by_type: self.defects_by_type.clone(),
            avg_confidence: self.avg_confidence,
        }
    }
}
