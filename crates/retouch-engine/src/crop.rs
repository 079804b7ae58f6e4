use image::imageops::FilterType as ResizeFilter;
use image::{DynamicImage, GenericImageView};
use retouch_contracts::image::{DataUri, ImageState};

use crate::error::EditorError;
use crate::providers::encode_png;

/// Fraction of the image width a default crop covers.
pub const DEFAULT_CROP_COVERAGE: f64 = 0.9;
pub const MAX_PIXEL_RATIO: f64 = 4.0;

const EDGE_TOLERANCE: f64 = 1e-6;

/// Crop rectangle in image-relative units: `0.0..=1.0` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, EditorError> {
        if ![x, y, width, height].iter().all(|value| value.is_finite()) {
            return Err(EditorError::InvalidCrop(
                "values must be finite numbers".to_string(),
            ));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(EditorError::InvalidCrop(
                "width and height must be positive".to_string(),
            ));
        }
        if x < 0.0 || y < 0.0 {
            return Err(EditorError::InvalidCrop(
                "x and y must not be negative".to_string(),
            ));
        }
        if x + width > 1.0 + EDGE_TOLERANCE || y + height > 1.0 + EDGE_TOLERANCE {
            return Err(EditorError::InvalidCrop(
                "rectangle extends past the image".to_string(),
            ));
        }
        Ok(Self {
            x,
            y,
            width: width.min(1.0 - x),
            height: height.min(1.0 - y),
        })
    }

    /// A centred 1:1 crop `coverage` of the image width wide, shrunk to fit the height.
    pub fn centered_square(image_width: u32, image_height: u32, coverage: f64) -> Self {
        let image_width = image_width.max(1) as f64;
        let image_height = image_height.max(1) as f64;
        let mut side = image_width * coverage.clamp(0.0, 1.0);
        if side > image_height {
            side = image_height;
        }
        let width = side / image_width;
        let height = side / image_height;
        Self {
            x: (1.0 - width) / 2.0,
            y: (1.0 - height) / 2.0,
            width,
            height,
        }
    }

    /// Source region in natural pixels, at least one pixel on each side.
    fn to_pixels(self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let left = ((self.x * image_width as f64).round() as u32)
            .min(image_width.saturating_sub(1));
        let top = ((self.y * image_height as f64).round() as u32)
            .min(image_height.saturating_sub(1));
        let width = ((self.width * image_width as f64).round() as u32)
            .clamp(1, image_width - left);
        let height = ((self.height * image_height as f64).round() as u32)
            .clamp(1, image_height - top);
        (left, top, width, height)
    }
}

/// Cuts `rect` out of `source` at natural resolution and scales the result by
/// `pixel_ratio`.
pub fn crop_image(
    source: &DynamicImage,
    rect: CropRect,
    pixel_ratio: f64,
) -> Result<DynamicImage, EditorError> {
    if !pixel_ratio.is_finite() || pixel_ratio <= 0.0 || pixel_ratio > MAX_PIXEL_RATIO {
        return Err(EditorError::InvalidCrop(format!(
            "pixel ratio must be within (0, {MAX_PIXEL_RATIO}]"
        )));
    }
    let (image_width, image_height) = source.dimensions();
    if image_width == 0 || image_height == 0 {
        return Err(EditorError::CropFailed("source image is empty".to_string()));
    }
    let (left, top, width, height) = rect.to_pixels(image_width, image_height);
    let cropped = source.crop_imm(left, top, width, height);
    let out_width = ((width as f64 * pixel_ratio).round() as u32).max(1);
    let out_height = ((height as f64 * pixel_ratio).round() as u32).max(1);
    if (out_width, out_height) == (width, height) {
        return Ok(cropped);
    }
    Ok(cropped.resize_exact(out_width, out_height, ResizeFilter::Lanczos3))
}

/// Crops a data-URI image and returns the new base image as PNG.
pub fn crop_data_uri(
    source: &str,
    rect: Option<CropRect>,
    pixel_ratio: f64,
) -> Result<ImageState, EditorError> {
    let data = DataUri::parse(source).map_err(|err| EditorError::CropFailed(err.to_string()))?;
    let decoded = image::load_from_memory(&data.bytes)
        .map_err(|err| EditorError::CropFailed(format!("could not decode image ({err})")))?;
    let rect = rect.unwrap_or_else(|| {
        CropRect::centered_square(decoded.width(), decoded.height(), DEFAULT_CROP_COVERAGE)
    });
    let cropped = crop_image(&decoded, rect, pixel_ratio)?;
    let bytes = encode_png(&cropped).map_err(|err| EditorError::CropFailed(err.to_string()))?;
    let output = DataUri::new("image/png", bytes);
    Ok(ImageState::new(output.encode(), output.mime_type))
}
