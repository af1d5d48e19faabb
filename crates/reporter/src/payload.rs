//! JSON bodies published by the sink.

use crate::{
    record::{DetectionRecord, StatsSummary},
    session::SystemStatus,
};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Serialize)]
pub struct DetectionPayload<'a> {
    pub timestamp: String,
    pub unix_timestamp: f64,
    pub defect_type: &'a str,
    pub confidence: f64,
    pub ring_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<&'a str>,
    pub session_id: &'a str,
}

impl<'a> From<&'a DetectionRecord> for DetectionPayload<'a> {
    fn from(record: &'a DetectionRecord) -> Self {
        Self {
            timestamp: record.timestamp.to_rfc3339(),
            unix_timestamp: record.unix_timestamp(),
            defect_type: &record.defect_type,
            confidence: round_to(record.confidence as f64, 4),
            ring_count: record.ring_count,
            image_filename: record.image_reference.as_deref(),
            session_id: &record.session_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusPayload<'a> {
    pub timestamp: String,
    pub is_active: bool,
    pub status: &'static str,
    pub session_id: &'a str,
    pub capture_count: u64,
    pub defect_count: u64,
    pub last_capture: Option<String>,
}

impl<'a> From<&'a SystemStatus> for StatusPayload<'a> {
    fn from(status: &'a SystemStatus) -> Self {
        Self {
            timestamp: status.timestamp.to_rfc3339(),
            is_active: status.is_active,
            status: status.status_label(),
            session_id: &status.session_id,
            capture_count: status.capture_count,
            defect_count: status.defect_count,
            last_capture: status.last_capture.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsPayload<'a> {
    pub timestamp: String,
    pub session_id: &'a str,
    pub total_captures: u64,
    pub total_defects: u64,
    pub clean_images: u64,
    pub dropped_frames: u64,
    pub defects_by_type: &'a BTreeMap<String, u64>,
    pub avg_confidence: f64,
}

impl<'a> StatsPayload<'a> {
    pub fn new(session_id: &'a str, stats: &'a StatsSummary, now: DateTime<Local>) -> Self {
        Self {
            timestamp: now.to_rfc3339(),
            session_id,
            total_captures: stats.total_captures,
            total_defects: stats.total_defects,
            clean_images: stats.clean_images,
            dropped_frames: stats.dropped_frames,
            defects_by_type: &stats.defects_by_type,
            avg_confidence: round_to(stats.avg_confidence, 4),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionPayload<'a> {
    pub timestamp: String,
    pub status: &'static str,
    pub session_id: &'a str,
    pub device_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    #[test]
    fn detection_payload_shape() {
        let ts = Local.timestamp_millis_opt(1_700_000_000_500).unwrap();
        let record = DetectionRecord::new(ts, "crack", 0.912_345, "20231114_221320")
            .with_ring_count(2)
            .with_image_reference(Some("detected_crack_20231114_221320_500.jpg".into()));

        let value: Value = serde_json::to_value(DetectionPayload::from(&record)).unwrap();

        assert_eq!(value["defect_type"], "crack");
        assert_eq!(value["confidence"], json!(0.9123));
        assert_eq!(value["ring_count"], 2);
        assert_eq!(value["unix_timestamp"], json!(1_700_000_000.5));
        assert_eq!(
            value["image_filename"],
            "detected_crack_20231114_221320_500.jpg"
        );
        assert_eq!(value["session_id"], "20231114_221320");
    }

    #[test]
    fn detection_payload_omits_missing_image() {
        let record = DetectionRecord::new(Local::now(), "scratch", 0.7, "s");
        let value: Value = serde_json::to_value(DetectionPayload::from(&record)).unwrap();
        assert!(value.get("image_filename").is_none());
    }

    #[test]
    fn status_payload_marks_stopped_sessions() {
        let mut session = Session::start(Local::now());
        session.running = false;
        session.capture_count = 3;

        let status = session.status(Local::now());
        let value: Value = serde_json::to_value(StatusPayload::from(&status)).unwrap();

        assert_eq!(value["is_active"], false);
        assert_eq!(value["status"], "stopped");
        assert_eq!(value["capture_count"], 3);
        assert_eq!(value["last_capture"], Value::Null);
    }

    #[test]
    fn stats_payload_includes_breakdown() {
        let mut stats = StatsSummary {
            total_captures: 10,
            total_defects: 3,
            clean_images: 7,
            avg_confidence: 0.812_345_6,
            ..Default::default()
        };
        stats.defects_by_type.insert("crack".into(), 2);
        stats.defects_by_type.insert("scratch".into(), 1);

        let value: Value =
            serde_json::to_value(StatsPayload::new("sess", &stats, Local::now())).unwrap();

        assert_eq!(value["defects_by_type"], json!({"crack": 2, "scratch": 1}));
        assert_eq!(value["avg_confidence"], json!(0.8123));
        assert_eq!(value["clean_images"], 7);
    }
}
