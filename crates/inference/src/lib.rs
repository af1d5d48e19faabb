pub mod backend;
pub mod config;
pub mod detection;
pub mod error;
pub mod postprocessing;
pub mod preprocessing;
pub mod yolo;

pub use backend::{InferenceBackend, InferenceOutput};
pub use config::DetectorConfig;
pub use detection::{BoundingBox, RawDetection};
pub use error::DetectorError;
pub use yolo::YoloDetector;

use image::RgbImage;

/// Object detector capability: given an image, return what it sees.
///
/// Calls are blocking and never made concurrently.
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        (**self).detect(image)
    }
}

/// Load the detector the binary was built with.
///
/// Fails when the model cannot be loaded, or when no backend feature is
/// compiled in.
#[cfg(feature = "ort-backend")]
pub fn load_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>, DetectorError> {
    config.validate()?;
    let detector = YoloDetector::<backend::ort::OrtBackend>::load(config)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "ort-backend"))]
pub fn load_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>, DetectorError> {
    config.validate()?;
    Err(DetectorError::ModelLoad {
        path: config.model_path.clone(),
        reason: "built without a model backend (enable the `ort-backend` feature)".into(),
    })
}
