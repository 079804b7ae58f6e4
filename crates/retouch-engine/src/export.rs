use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgba};
use retouch_contracts::image::DataUri;
use retouch_contracts::session::FilterType;

use crate::error::EditorError;
use crate::providers::encode_png;

pub fn export_file_name(timestamp_millis: i64) -> String {
    format!("edited-photo-{timestamp_millis}.png")
}

/// Applies a display filter to the pixels.
pub fn apply_filter(image: DynamicImage, filter: FilterType) -> DynamicImage {
    match filter {
        FilterType::None => image,
        FilterType::Grayscale => DynamicImage::ImageRgba8(image.grayscale().to_rgba8()),
        FilterType::Invert => {
            let mut image = image;
            image.invert();
            image
        }
        FilterType::Sepia => {
            let mut rgba = image.to_rgba8();
            for pixel in rgba.pixels_mut() {
                let Rgba([r, g, b, a]) = *pixel;
                let (r, g, b) = (r as f32, g as f32, b as f32);
                let tone = |kr: f32, kg: f32, kb: f32| (r * kr + g * kg + b * kb).min(255.0) as u8;
                *pixel = Rgba([
                    tone(0.393, 0.769, 0.189),
                    tone(0.349, 0.686, 0.168),
                    tone(0.272, 0.534, 0.131),
                    a,
                ]);
            }
            DynamicImage::ImageRgba8(rgba)
        }
    }
}

/// Writes `data_uri` into `out_dir` as a PNG named after `timestamp_millis`.
pub fn export_png(
    data_uri: &str,
    out_dir: &Path,
    filter: FilterType,
    timestamp_millis: i64,
) -> Result<PathBuf, EditorError> {
    let data = DataUri::parse(data_uri).map_err(|err| EditorError::ExportFailed(err.to_string()))?;
    let decoded = image::load_from_memory(&data.bytes)
        .map_err(|err| EditorError::ExportFailed(format!("could not decode image ({err})")))?;
    let bytes = encode_png(&apply_filter(decoded, filter))
        .map_err(|err| EditorError::ExportFailed(err.to_string()))?;
    std::fs::create_dir_all(out_dir).map_err(|err| {
        EditorError::ExportFailed(format!("cannot create {} ({err})", out_dir.display()))
    })?;
    let path = out_dir.join(export_file_name(timestamp_millis));
    std::fs::write(&path, bytes).map_err(|err| {
        EditorError::ExportFailed(format!("cannot write {} ({err})", path.display()))
    })?;
    Ok(path)
}
