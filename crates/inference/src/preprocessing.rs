use crate::error::DetectorError;
use image::{ImageBuffer, Rgb, RgbImage, imageops};
use ndarray::{Array, IxDyn};

/// Gray used by YOLO letterboxing
const PAD_VALUE: u8 = 114;

/// Maps model-input coordinates back onto the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl TransformParams {
    /// Undo the letterbox for one point, clamped to the original image.
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let ox = ((x - self.offset_x) / self.scale).clamp(0.0, self.orig_width as f32);
        let oy = ((y - self.offset_y) / self.scale).clamp(0.0, self.orig_height as f32);
        (ox, oy)
    }
}

pub struct PreProcessor {
    input_size: u32,
}

impl PreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Letterbox `image` into a square NCHW float tensor normalized to `[0, 1]`.
    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn preprocess(
        &self,
        image: &RgbImage,
    ) -> Result<(Array<f32, IxDyn>, TransformParams), DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::Preprocess(format!(
                "empty image {}x{}",
                width, height
            )));
        }

        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, size);
        let new_height = ((height as f32 * scale) as u32).clamp(1, size);

        let resized = imageops::resize(
            image,
            new_width,
            new_height,
            imageops::FilterType::Triangle,
        );

        let mut letterboxed: RgbImage =
            ImageBuffer::from_pixel(size, size, Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]));
        let offset_x = (size - new_width) / 2;
        let offset_y = (size - new_height) / 2;
        imageops::overlay(&mut letterboxed, &resized, offset_x as i64, offset_y as i64);

        let side = size as usize;
        let mut input = Array::zeros(IxDyn(&[1, 3, side, side]));
        for (x, y, pixel) in letterboxed.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        };

        Ok((input, transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_image_is_padded_vertically() {
        let image = RgbImage::from_pixel(128, 64, Rgb([255, 0, 0]));
        let (tensor, transform) = PreProcessor::new(64).preprocess(&image).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert!((transform.scale - 0.5).abs() < 1e-6);
        assert_eq!(transform.offset_x, 0.0);
        assert_eq!(transform.offset_y, 16.0);

        // Top padding row is gray, centre row is red
        let gray = PAD_VALUE as f32 / 255.0;
        assert!((tensor[[0, 0, 0, 10]] - gray).abs() < 1e-6);
        assert!((tensor[[0, 0, 32, 10]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 32, 10]].abs() < 1e-6);
    }

    #[test]
    fn test_to_original_inverts_letterbox() {
        let transform = TransformParams {
            orig_width: 128,
            orig_height: 64,
            scale: 0.5,
            offset_x: 0.0,
            offset_y: 16.0,
        };

        assert_eq!(transform.to_original(32.0, 32.0), (64.0, 32.0));
        // Points in the padding clamp to the image border
        assert_eq!(transform.to_original(-5.0, 0.0), (0.0, 0.0));
        assert_eq!(transform.to_original(64.0, 64.0), (128.0, 64.0));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = RgbImage::new(0, 0);
        assert!(matches!(
            PreProcessor::new(64).preprocess(&image),
            Err(DetectorError::Preprocess(_))
        ));
    }
}
