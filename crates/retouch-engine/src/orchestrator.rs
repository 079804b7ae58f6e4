use std::sync::Arc;
use std::time::{Duration, Instant};

use retouch_contracts::image::{encode_data_uri, DataUri};
use retouch_contracts::session::BlurIntensity;
use serde_json::{Map, Value};

use crate::error::EditorError;
use crate::providers::{error_chain_text, EditProvider, EditRequest};

pub const ENHANCE_PREFIX: &str =
    "Enhance the quality, details, and resolution of the image. Then, ";

const ERROR_DETAIL_MAX_CHARS: usize = 600;

/// Builds the instruction for a free-text edit.
pub fn prompt_instruction(prompt: &str, enhance_quality: bool) -> Result<String, EditorError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(EditorError::EmptyPrompt);
    }
    if enhance_quality {
        return Ok(format!("{ENHANCE_PREFIX}{prompt}"));
    }
    Ok(prompt.to_string())
}

pub fn blur_instruction(intensity: BlurIntensity) -> String {
    format!(
        "Apply a {intensity} intensity photographic background blur, keeping the main subject in sharp focus."
    )
}

/// What an edit operates on. Carries everything the provider call needs, so it can be sent
/// to another thread while the session stays busy.
pub struct EditJob {
    pub id: String,
    pub instruction: String,
    pub model: String,
    pub provider_name: String,
    source: DataUri,
    provider: Arc<dyn EditProvider>,
    provider_options: Map<String, Value>,
}

impl EditJob {
    pub(crate) fn new(
        instruction: String,
        model: String,
        source: DataUri,
        provider: Arc<dyn EditProvider>,
        provider_options: Map<String, Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instruction,
            model,
            provider_name: provider.name().to_string(),
            source,
            provider,
            provider_options,
        }
    }

    pub fn source_mime_type(&self) -> &str {
        &self.source.mime_type
    }

    /// Calls the provider. Never touches the session.
    pub fn run(self) -> EditOutcome {
        let started = Instant::now();
        let request = EditRequest {
            image: self.source,
            instruction: self.instruction.clone(),
            model: self.model,
            provider_options: self.provider_options,
        };
        let result = match self.provider.edit(&request) {
            Ok(edited) if edited.bytes.is_empty() => {
                Err("provider returned an empty image".to_string())
            }
            Ok(edited) => {
                let mime_type = edited
                    .mime_type
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| value.starts_with("image/"))
                    .unwrap_or(request.image.mime_type.as_str())
                    .to_string();
                Ok(EditResult {
                    data_uri: encode_data_uri(&mime_type, &edited.bytes),
                    mime_type,
                    warnings: edited.warnings,
                })
            }
            Err(err) => Err(error_chain_text(&err, ERROR_DETAIL_MAX_CHARS)),
        };
        EditOutcome {
            job_id: self.id,
            instruction: self.instruction,
            elapsed: started.elapsed(),
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditResult {
    pub data_uri: String,
    pub mime_type: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub job_id: String,
    pub instruction: String,
    pub elapsed: Duration,
    /// The failure side holds the provider's error detail.
    pub result: Result<EditResult, String>,
}
