use std::collections::BTreeMap;
use std::env;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgba};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use retouch_contracts::image::DataUri;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image: DataUri,
    pub instruction: String,
    pub model: String,
    pub provider_options: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct EditedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub warnings: Vec<String>,
}

/// An external image editor: source image + instruction in, edited image out.
pub trait EditProvider: Send + Sync {
    fn name(&self) -> &str;
    fn edit(&self, request: &EditRequest) -> Result<EditedImage>;
}

#[derive(Default, Clone)]
pub struct EditProviderRegistry {
    providers: BTreeMap<String, Arc<dyn EditProvider>>,
}

impl EditProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering a provider under an existing name replaces it.
    pub fn register<P: EditProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EditProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry() -> EditProviderRegistry {
    let mut providers = EditProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(GeminiProvider::new());
    providers
}

/// Offline editor: tints the source towards a colour derived from the instruction and
/// returns a PNG. Deterministic for a given image and instruction.
pub struct DryrunProvider;

impl EditProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn edit(&self, request: &EditRequest) -> Result<EditedImage> {
        let source = image::load_from_memory(&request.image.bytes)
            .context("dryrun could not decode the source image")?;
        let (r, g, b) = color_from_instruction(&request.instruction);
        let mut rgba = source.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let Rgba([pr, pg, pb, pa]) = *pixel;
            *pixel = Rgba([blend(pr, r), blend(pg, g), blend(pb, b), pa]);
        }
        let bytes = encode_png(&DynamicImage::ImageRgba8(rgba))?;
        Ok(EditedImage {
            bytes,
            mime_type: Some("image/png".to_string()),
            warnings: Vec::new(),
        })
    }
}

fn blend(base: u8, tint: u8) -> u8 {
    ((base as u16 * 3 + tint as u16) / 4) as u8
}

fn color_from_instruction(instruction: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("PNG encode failed")?;
    Ok(out.into_inner())
}

pub struct GeminiProvider {
    api_base: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::with_api_base(
            env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
        )
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &EditRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.image.mime_type,
                            "data": request.image.base64_payload(),
                        }
                    },
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }

    fn request_timeout_seconds(request: &EditRequest) -> f64 {
        value_as_f64(
            request.provider_options.get("request_timeout"),
            90.0,
            15.0,
            300.0,
        )
    }

    fn transport_retry_count(request: &EditRequest) -> usize {
        let retries_value = request
            .provider_options
            .get("transport_retries")
            .or_else(|| request.provider_options.get("request_retries"));
        value_as_f64(retries_value, 2.0, 0.0, 4.0).round() as usize
    }

    fn retry_backoff_seconds(request: &EditRequest) -> f64 {
        value_as_f64(
            request.provider_options.get("retry_backoff"),
            1.2,
            0.1,
            10.0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
        timeout_s: f64,
        max_retries: usize,
        retry_backoff_s: f64,
        warnings: &mut Vec<String>,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(Duration::from_secs_f64(timeout_s))
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    let message = format!(
                        "Gemini transport retry {}/{} after transient request failure.",
                        attempt + 1,
                        max_retries
                    );
                    log::warn!("{message}");
                    push_unique_warning(warnings, message);
                    let delay_s = retry_backoff_s * (attempt as f64 + 1.0);
                    thread::sleep(Duration::from_secs_f64(delay_s));
                    attempt += 1;
                }
            }
        }
    }

    /// First inline image of the first candidate that has one. Text parts are collected so
    /// a refusal can be reported when no image comes back.
    fn extract_image(response_payload: &Value) -> Result<EditedImage> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut texts = Vec::new();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        texts.push(text.trim().to_string());
                    }
                }
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .context("Gemini image base64 decode failed")?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Ok(EditedImage {
                    bytes,
                    mime_type,
                    warnings: Vec::new(),
                });
            }
        }

        if let Some(reason) = response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the request ({reason})");
        }
        if texts.is_empty() {
            bail!("Gemini returned no image");
        }
        bail!(
            "Gemini returned no image: {}",
            truncate_text(&texts.join(" "), 280)
        )
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EditProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn edit(&self, request: &EditRequest) -> Result<EditedImage> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        let mut warnings = Vec::new();

        let response = self.post_with_transport_retries(
            &endpoint,
            &api_key,
            &payload,
            Self::request_timeout_seconds(request),
            Self::transport_retry_count(request),
            Self::retry_backoff_seconds(request),
            &mut warnings,
        )?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let mut edited = Self::extract_image(&response_payload)?;
        edited.warnings = warnings;
        Ok(edited)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

/// Flattens an error chain into one line, skipping repeated messages.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() || warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn value_as_f64(value: Option<&Value>, default: f64, min: f64, max: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
