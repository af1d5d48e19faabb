use crate::{error::PersistError, policy::Defect};
use capture::Frame;
use chrono::{DateTime, Local};
use image::{ImageFormat, Rgb, RgbImage};
use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

pub const DEFAULT_OUTPUT_DIR: &str = "detected_faults";

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 3;

/// `detected_{type}_{YYYYMMDD_HHMMSS_mmm}.jpg`, local time.
pub fn detection_filename(defect_type: &str, at: &DateTime<Local>) -> String {
    format!(
        "detected_{}_{}.jpg",
        defect_type.to_lowercase(),
        at.format("%Y%m%d_%H%M%S_%3f")
    )
}

/// Directory of annotated defect frames.
#[derive(Debug, Clone)]
pub struct DetectionArchive {
    dir: PathBuf,
}

impl DetectionArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Draw every defect onto a copy of the frame and write it as JPEG.
    ///
    /// The file only appears once fully encoded. Returns the file name.
    pub fn save(
        &self,
        frame: &Frame,
        defect_type: &str,
        defects: &[Defect],
    ) -> Result<String, PersistError> {
        fs::create_dir_all(&self.dir).map_err(|source| PersistError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut image = frame.image.clone();
        for defect in defects {
            draw_box(&mut image, defect);
        }

        let mut encoded = Vec::new();
        image.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;

        let filename = detection_filename(defect_type, &frame.captured_at);
        let path = self.dir.join(&filename);
        fs::write(&path, encoded).map_err(|source| PersistError::Write { path, source })?;

        Ok(filename)
    }
}

/// Outline the defect's box, clamped to the image.
fn draw_box(image: &mut RgbImage, defect: &Defect) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max - 1);
    let x1 = clamp(defect.bbox.x, width);
    let y1 = clamp(defect.bbox.y, height);
    let x2 = clamp(defect.bbox.x2(), width);
    let y2 = clamp(defect.bbox.y2(), height);

    for t in 0..BOX_THICKNESS {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            image.put_pixel(x, top, BOX_COLOR);
            image.put_pixel(x, bottom, BOX_COLOR);
        }

        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            image.put_pixel(left, y, BOX_COLOR);
            image.put_pixel(right, y, BOX_COLOR);
        }
    }
}
