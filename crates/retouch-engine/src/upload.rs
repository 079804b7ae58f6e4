use std::path::Path;

use retouch_contracts::image::{
    encode_data_uri, is_supported_upload_mime, mime_for_path, ImageState,
};

use crate::error::EditorError;

/// Reads an image file into a new base image.
pub fn read_image_file(path: &Path) -> Result<ImageState, EditorError> {
    let bytes = std::fs::read(path).map_err(EditorError::FileRead)?;
    let mime_type = mime_for_path(path)
        .map(str::to_string)
        .or_else(|| sniff_mime_type(&bytes))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    image_state_from_bytes(&bytes, &mime_type)
}

pub fn image_state_from_bytes(bytes: &[u8], mime_type: &str) -> Result<ImageState, EditorError> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    if !is_supported_upload_mime(&mime_type) {
        return Err(EditorError::UnsupportedMediaType(mime_type));
    }
    if bytes.is_empty() {
        return Err(EditorError::FileRead(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "image file is empty",
        )));
    }
    Ok(ImageState::new(encode_data_uri(&mime_type, bytes), mime_type))
}

fn sniff_mime_type(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};

    use super::{image_state_from_bytes, read_image_file};
    use crate::error::EditorError;
    use crate::providers::encode_png;

    #[test]
    fn reads_png_into_data_uri() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.png");
        let bytes = encode_png(&DynamicImage::ImageRgb8(RgbImage::new(3, 3)))?;
        std::fs::write(&path, &bytes)?;
        let state = read_image_file(&path)?;
        assert_eq!(state.mime_type, "image/png");
        assert!(state
            .original_image
            .as_deref()
            .unwrap_or_default()
            .starts_with("data:image/png;base64,"));
        Ok(())
    }

    #[test]
    fn sniffs_mime_when_extension_is_missing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("upload");
        std::fs::write(&path, encode_png(&DynamicImage::ImageRgb8(RgbImage::new(1, 1)))?)?;
        assert_eq!(read_image_file(&path)?.mime_type, "image/png");
        Ok(())
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_image_file(std::path::Path::new("/definitely/not/here.png"))
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("Failed to read the image file."));
    }

    #[test]
    fn unsupported_types_are_rejected() {
        assert!(matches!(
            image_state_from_bytes(b"GIF89a", "image/gif"),
            Err(EditorError::UnsupportedMediaType(mime)) if mime == "image/gif"
        ));
        assert!(matches!(
            image_state_from_bytes(b"", "image/png"),
            Err(EditorError::FileRead(_))
        ));
    }
}
