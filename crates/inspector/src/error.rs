use capture::CaptureError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures that end a run.
#[derive(Error, Debug)]
pub enum InspectError {
    #[error("camera lost after {attempts} failed reconnect attempts: {source}")]
    CameraLost {
        attempts: u32,
        #[source]
        source: CaptureError,
    },

    #[error("frame source could not be opened: {0}")]
    SourceInit(#[source] CaptureError),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
