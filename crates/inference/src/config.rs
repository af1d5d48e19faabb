use crate::error::DetectorError;
use std::path::PathBuf;

pub const DEFAULT_CLASS_NAMES: [&str; 3] = ["breakage", "crack", "scratch"];

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Square model input edge, in pixels
    pub input_size: u32,
    /// Candidate threshold applied by the detector itself
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Class index to label
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("runs/detect/train/weights/best.onnx"),
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 300,
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectorError::Config(format!(
                "confidence threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(DetectorError::Config(format!(
                "IoU threshold {} outside [0, 1]",
                self.iou_threshold
            )));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(DetectorError::Config(format!(
                "input size {} must be a positive multiple of 32",
                self.input_size
            )));
        }
        if self.class_names.is_empty() {
            return Err(DetectorError::Config("no class names given".into()));
        }
        Ok(())
    }
}
