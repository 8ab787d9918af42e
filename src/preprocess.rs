use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),
}

/// Spatial size the scorer was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
}

impl InputShape {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// RGB image rescaled into [0, 1], laid out as `(1, height, width, 3)`.
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
    data: Array<f32, Ix4>,
}

impl PreprocessedTensor {
    /// `(height, width, channels)` of the single image in the batch.
    pub fn shape(&self) -> (usize, usize, usize) {
        let dims = self.data.shape();
        (dims[1], dims[2], dims[3])
    }

    pub fn as_batch(&self) -> &Array<f32, Ix4> {
        &self.data
    }
}

pub fn transform_image(
    image_data: &[u8],
    shape: InputShape,
) -> Result<PreprocessedTensor, PreprocessError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessError::UnsupportedImageFormat(e.to_string()))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| PreprocessError::UnsupportedImageFormat(e.to_string()))?;

    // Grayscale, palette and alpha images must become plain RGB before resizing.
    let rgb = DynamicImage::ImageRgb8(original_img.to_rgb8());
    let img = rgb
        .resize_exact(shape.width, shape.height, FilterType::CatmullRom)
        .to_rgb8();

    let mut input = Array::zeros((1, shape.height as usize, shape.width as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }

    Ok(PreprocessedTensor { data: input })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    // One step of 8-bit quantisation, resampling may round either way.
    const PIXEL_TOLERANCE: f32 = 1.5 / 255.0;

    pub(crate) fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    fn assert_in_unit_range(tensor: &PreprocessedTensor) {
        assert!(tensor
            .as_batch()
            .iter()
            .all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_transform_rgb_image() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 100, Rgb([255, 0, 0]));
        let image_data = encode_png(DynamicImage::ImageRgb8(img));

        let tensor = transform_image(&image_data, InputShape::new(128, 128)).unwrap();

        assert_eq!(tensor.shape(), (128, 128, 3));
        assert_eq!(tensor.as_batch().shape(), &[1, 128, 128, 3]);
        assert_in_unit_range(&tensor);
        assert!((tensor.as_batch()[[0, 64, 64, 0]] - 1.0).abs() < PIXEL_TOLERANCE);
        assert!(tensor.as_batch()[[0, 64, 64, 1]].abs() < PIXEL_TOLERANCE);
    }

    #[test]
    fn test_non_square_image_is_stretched_to_target() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(300, 40, Rgb([10, 200, 30]));
        let image_data = encode_png(DynamicImage::ImageRgb8(img));

        let tensor = transform_image(&image_data, InputShape::new(256, 128)).unwrap();

        assert_eq!(tensor.shape(), (128, 256, 3));
        assert_in_unit_range(&tensor);
    }

    #[test]
    fn test_grayscale_image_becomes_three_channels() {
        let img = GrayImage::from_pixel(50, 70, Luma([128]));
        let image_data = encode_png(DynamicImage::ImageLuma8(img));

        let tensor = transform_image(&image_data, InputShape::new(128, 128)).unwrap();

        assert_eq!(tensor.shape(), (128, 128, 3));
        let batch = tensor.as_batch();
        let expected = 128.0 / 255.0;
        for c in 0..3 {
            assert!((batch[[0, 10, 10, c]] - expected).abs() < PIXEL_TOLERANCE);
        }
    }

    #[test]
    fn test_rgba_image_drops_alpha() {
        let img = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 255, 0]));
        let image_data = encode_png(DynamicImage::ImageRgba8(img));

        let tensor = transform_image(&image_data, InputShape::new(64, 64)).unwrap();

        assert_eq!(tensor.shape(), (64, 64, 3));
        assert!((tensor.as_batch()[[0, 0, 0, 2]] - 1.0).abs() < PIXEL_TOLERANCE);
    }

    #[test]
    fn test_undecodable_bytes_are_rejected() {
        let result = transform_image(b"definitely not an image", InputShape::new(128, 128));
        assert!(matches!(
            result,
            Err(PreprocessError::UnsupportedImageFormat(_))
        ));
    }
}
