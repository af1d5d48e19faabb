use crate::{
    error::CaptureError,
    frame::{Frame, FrameOrigin},
    source::{Acquired, FrameSource},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Extensions picked up from a directory, matched case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

/// Finite, non-restartable sequence over a fixed list of image files.
///
/// Files are decoded lazily, one per `next_frame` call. Once the list is
/// exhausted every further call yields [`Acquired::EndOfStream`].
#[derive(Debug)]
pub struct FileBatch {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl FileBatch {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, cursor: 0 }
    }

    /// Build a batch from a directory (all images, sorted) or a single file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;

        if !metadata.is_dir() {
            return Ok(Self::new(vec![path.to_path_buf()]));
        }

        let paths = scan_dir(path)?;
        if paths.is_empty() {
            return Err(CaptureError::NoImages(path.to_path_buf()));
        }

        tracing::info!(
            directory = %path.display(),
            count = paths.len(),
            first = ?paths.iter().take(3).filter_map(|p| p.file_name()).collect::<Vec<_>>(),
            "Found images to process"
        );

        Ok(Self::new(paths))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.paths.len().saturating_sub(self.cursor)
    }
}

/// Image files directly inside `dir`, sorted lexicographically.
pub fn scan_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl FrameSource for FileBatch {
    fn connect(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Acquired, CaptureError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(Acquired::EndOfStream);
        };
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|source| CaptureError::Unreadable {
                path: path.clone(),
                source,
            })?
            .to_rgb8();

        Ok(Acquired::Frame(Frame::new(
            image,
            FrameOrigin::File(path.clone()),
        )))
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.paths.len()
    }

    fn describe(&self) -> String {
        format!("file batch ({} images)", self.paths.len())
    }
}
