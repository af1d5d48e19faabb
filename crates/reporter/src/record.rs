use chrono::{DateTime, Local};
use std::collections::BTreeMap;

/// One persisted defect report; at most one per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Local>,
    /// Highest qualifying confidence in the frame
    pub confidence: f32,
    /// Lower-cased label of the frame's primary defect
    pub defect_type: String,
    /// Number of qualifying defects in the frame; 1 unless set otherwise
    pub ring_count: u32,
    /// File name of the saved annotated frame; `None` when nothing was saved
    pub image_reference: Option<String>,
    pub session_id: String,
}

impl DetectionRecord {
    pub fn new(
        timestamp: DateTime<Local>,
        defect_type: &str,
        confidence: f32,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            confidence,
            defect_type: defect_type.to_lowercase(),
            ring_count: 1,
            image_reference: None,
            session_id: session_id.into(),
        }
    }

    pub fn with_ring_count(mut self, ring_count: u32) -> Self {
        self.ring_count = ring_count;
        self
    }

    pub fn with_image_reference(mut self, image_reference: Option<String>) -> Self {
        self.image_reference = image_reference;
        self
    }

    pub fn unix_timestamp(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Storage key: unix milliseconds of the capture
    pub fn key(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Aggregates for one session, as flushed to the sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub total_captures: u64,
    pub total_defects: u64,
    pub clean_images: u64,
    pub dropped_frames: u64,
    pub defects_by_type: BTreeMap<String, u64>,
    /// Mean reported confidence over defect frames; 0 when there were none
    pub avg_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_record_normalizes_label_and_defaults() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let record = DetectionRecord::new(ts, "Crack", 0.91, "20240309_140000");

        assert_eq!(record.defect_type, "crack");
        assert_eq!(record.ring_count, 1);
        assert_eq!(record.image_reference, None);
        assert_eq!(record.key(), ts.timestamp_millis());
    }

    #[test]
    fn builders_set_optional_fields() {
        let record = DetectionRecord::new(Local::now(), "scratch", 0.7, "s")
            .with_ring_count(3)
            .with_image_reference(Some("detected_scratch_x.jpg".into()));

        assert_eq!(record.ring_count, 3);
        assert_eq!(
            record.image_reference.as_deref(),
            Some("detected_scratch_x.jpg")
        );
    }

    #[test]
    fn unix_timestamp_has_sub_second_precision() {
        let ts = Local.timestamp_millis_opt(1_700_000_000_250).unwrap();
        let record = DetectionRecord::new(ts, "crack", 0.8, "s");
        assert!((record.unix_timestamp() - 1_700_000_000.25).abs() < 1e-6);
        assert_eq!(record.key(), 1_700_000_000_250);
    }
}
