use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera disconnected: {0}")]
    Disconnected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not read image {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("empty or undecodable frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("no images found in {0}")]
    NoImages(PathBuf),
}

impl CaptureError {
    /// Transient failures affect a single frame; the source stays usable.
    ///
    /// Anything else means the connection is gone and must be re-established.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Unreadable { .. } | CaptureError::Decode(_))
    }
}
