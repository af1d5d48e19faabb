use ndarray::{Array, ArrayD, IxDyn};
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// A runtime able to execute the exported detection model.
pub trait InferenceBackend {
    fn load_model(path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run the model on a letterboxed `[1, 3, H, W]` input
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;
}

pub struct InferenceOutput {
    pub predictions: ArrayD<f32>, // [1, 4 + num_classes, anchors] cxcywh in input pixels + class scores
}
