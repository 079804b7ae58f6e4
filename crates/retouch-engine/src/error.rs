use thiserror::Error;

/// User-facing failures. `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Please upload an image first.")]
    NoImage,
    #[error("Please enter an editing prompt.")]
    EmptyPrompt,
    #[error("An edit is already in progress. Wait for it to finish.")]
    Busy,
    #[error("Make an edit before choosing a filter.")]
    NoEditedImage,
    #[error("Unsupported image type '{0}'. Upload a PNG, JPEG, or WEBP image.")]
    UnsupportedMediaType(String),
    #[error("Invalid crop: {0}")]
    InvalidCrop(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Failed to read the image file.")]
    FileRead(#[source] std::io::Error),
    #[error("Failed to crop image: {0}")]
    CropFailed(String),
    #[error("Failed to export image: {0}")]
    ExportFailed(String),
    #[error("An error occurred during editing: {0}")]
    EditFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Io,
    Api,
}

impl EditorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EditorError::NoImage
            | EditorError::EmptyPrompt
            | EditorError::Busy
            | EditorError::NoEditedImage
            | EditorError::UnsupportedMediaType(_)
            | EditorError::InvalidCrop(_)
            | EditorError::InvalidArgument(_) => ErrorKind::Input,
            EditorError::FileRead(_)
            | EditorError::CropFailed(_)
            | EditorError::ExportFailed(_) => ErrorKind::Io,
            EditorError::EditFailed(_) => ErrorKind::Api,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EditorError, ErrorKind};

    #[test]
    fn messages_match_user_copy() {
        assert_eq!(EditorError::NoImage.to_string(), "Please upload an image first.");
        assert_eq!(
            EditorError::EmptyPrompt.to_string(),
            "Please enter an editing prompt."
        );
        assert_eq!(
            EditorError::EditFailed("quota exceeded".to_string()).to_string(),
            "An error occurred during editing: quota exceeded"
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            EditorError::FileRead(io).to_string(),
            "Failed to read the image file."
        );
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(EditorError::Busy.kind(), ErrorKind::Input);
        assert_eq!(
            EditorError::ExportFailed("disk full".to_string()).kind(),
            ErrorKind::Io
        );
        assert_eq!(EditorError::EditFailed(String::new()).kind(), ErrorKind::Api);
    }
}
