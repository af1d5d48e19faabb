use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model failed to load from {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("invalid detector configuration: {0}")]
    Config(String),

    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    #[error("inference failed: {0}")]
    Inference(#[from] anyhow::Error),

    #[error("unexpected model output: {0}")]
    Output(String),
}
