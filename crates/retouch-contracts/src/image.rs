use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const SUPPORTED_UPLOAD_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// The base image of a session, stored as a data URI.
///
/// `original_image` is `None` until something is uploaded. Serialized with the camelCase keys
/// used by the session slot (`originalImage`, `mimeType`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageState {
    pub original_image: Option<String>,
    #[serde(default)]
    pub mime_type: String,
}

impl ImageState {
    pub fn new(data_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            original_image: Some(data_uri.into()),
            mime_type: mime_type.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.original_image
            .as_deref()
            .map(|value| !value.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Parses `data:<mime>;base64,<payload>`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let Some(rest) = raw.trim().strip_prefix("data:") else {
            bail!("Invalid image data URL.");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("Invalid image data URL.");
        };
        let mut params = header.split(';');
        let mime_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
            bail!("Invalid image data URL.");
        }
        if payload.is_empty() {
            bail!("Invalid image data URL.");
        }
        let bytes = BASE64
            .decode(payload.as_bytes())
            .context("image data URL payload is not valid base64")?;
        Ok(Self { mime_type, bytes })
    }

    pub fn encode(&self) -> String {
        encode_data_uri(&self.mime_type, &self.bytes)
    }

    pub fn base64_payload(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(bytes))
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn is_supported_upload_mime(mime_type: &str) -> bool {
    let lowered = mime_type.trim().to_ascii_lowercase();
    SUPPORTED_UPLOAD_MIME_TYPES
        .iter()
        .any(|supported| *supported == lowered)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{encode_data_uri, is_supported_upload_mime, mime_for_path, DataUri, ImageState};

    #[test]
    fn data_uri_parse_reads_mime_and_payload() -> anyhow::Result<()> {
        let raw = encode_data_uri("image/webp", b"pixels");
        let parsed = DataUri::parse(&raw)?;
        assert_eq!(parsed.mime_type, "image/webp");
        assert_eq!(parsed.bytes, b"pixels".to_vec());
        assert_eq!(parsed.encode(), raw);
        Ok(())
    }

    #[test]
    fn data_uri_parse_rejects_missing_payload_and_plain_text() {
        for raw in [
            "data:image/png;base64,",
            "data:image/png,plain",
            "image/png;base64,AAAA",
            "not a data url",
        ] {
            let err = DataUri::parse(raw).err().map(|err| err.to_string());
            assert_eq!(err.as_deref(), Some("Invalid image data URL."), "{raw}");
        }
    }

    #[test]
    fn data_uri_parse_rejects_bad_base64() {
        assert!(DataUri::parse("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn image_state_serializes_with_slot_keys() -> anyhow::Result<()> {
        let state = ImageState::new("data:image/png;base64,AAAA", "image/png");
        let value = serde_json::to_value(&state)?;
        assert_eq!(value["originalImage"], "data:image/png;base64,AAAA");
        assert_eq!(value["mimeType"], "image/png");
        assert!(state.is_loaded());
        assert!(!ImageState::default().is_loaded());
        Ok(())
    }

    #[test]
    fn upload_mime_detection() {
        assert_eq!(mime_for_path(Path::new("a/b/Photo.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("scan.webp")), Some("image/webp"));
        assert_eq!(mime_for_path(Path::new("anim.gif")), None);
        assert!(is_supported_upload_mime("IMAGE/PNG"));
        assert!(!is_supported_upload_mime("image/gif"));
    }
}
