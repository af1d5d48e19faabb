use crate::{
    Detector,
    backend::{InferenceBackend, InferenceOutput},
    config::DetectorConfig,
    detection::RawDetection,
    error::DetectorError,
    postprocessing::PostProcessor,
    preprocessing::PreProcessor,
};
use image::RgbImage;

/// Letterbox, run the backend, decode and NMS: one blocking call per image.
pub struct YoloDetector<B: InferenceBackend> {
    backend: B,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
}

impl<B: InferenceBackend> YoloDetector<B> {
    pub fn new(backend: B, config: &DetectorConfig) -> Self {
        Self {
            backend,
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(config),
        }
    }

    /// Load the model once; a failure here is fatal for the caller.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectorError> {
        tracing::info!(model_path = %config.model_path.display(), "Loading detection model");
        let backend =
            B::load_model(&config.model_path).map_err(|e| DetectorError::ModelLoad {
                path: config.model_path.clone(),
                reason: format!("{:#}", e),
            })?;
        Ok(Self::new(backend, config))
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        let (input, transform) = self.preprocessor.preprocess(image)?;

        let InferenceOutput { predictions } = {
            let _infer_span = tracing::debug_span!("model_inference").entered();
            self.backend.infer(&input)?
        };

        self.postprocessor
            .parse_detections(&predictions.view(), &transform)
    }
}
