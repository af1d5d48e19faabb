use crate::error::CaptureError;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOrigin {
    Camera(String),
    File(PathBuf),
}

impl fmt::Display for FrameOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameOrigin::Camera(url) => write!(f, "camera {}", url),
            FrameOrigin::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// A decoded RGB image plus where and when it was acquired.
///
/// Owned by the iteration that captured it and dropped once that
/// iteration is done with it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
    pub origin: FrameOrigin,
}

impl Frame {
    pub fn new(image: RgbImage, origin: FrameOrigin) -> Self {
        Self {
            image,
            captured_at: Local::now(),
            origin,
        }
    }

    /// Decode an encoded image (JPEG, PNG, ...) into an RGB frame.
    pub fn decode(bytes: &[u8], origin: FrameOrigin) -> Result<Self, CaptureError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::new(image, origin))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
