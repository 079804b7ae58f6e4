pub mod crop;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod providers;
pub mod session;
pub mod upload;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use retouch_contracts::events::{EventKind, EventPayload, EventWriter};
use retouch_contracts::image::{DataUri, ImageState};
use retouch_contracts::models::ModelRegistry;
use retouch_contracts::session::{BlurIntensity, FilterType, SessionStore};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub use crop::CropRect;
pub use error::{EditorError, ErrorKind};
pub use orchestrator::{EditJob, EditOutcome, EditResult};
pub use providers::{
    default_provider_registry, DryrunProvider, EditProvider, EditProviderRegistry, EditRequest,
    EditedImage, GeminiProvider,
};
pub use session::EditorSession;

/// Point-in-time summary of the session for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub loaded: bool,
    pub mime_type: Option<String>,
    pub history_len: usize,
    pub history_index: i64,
    pub can_undo: bool,
    pub can_redo: bool,
    pub showing_original: bool,
    pub enhance_quality: bool,
    pub blur_intensity: BlurIntensity,
    pub active_filter: FilterType,
    pub busy: bool,
    pub error: Option<String>,
    pub image_model: Option<String>,
    pub slot_path: PathBuf,
}

/// Owns one editing session together with its slot, event log and edit providers.
///
/// Every state change is written back to the slot right away. Slot and event-log
/// failures are logged and never fail the action that caused them.
pub struct EditorEngine {
    state_dir: PathBuf,
    session_id: String,
    session: EditorSession,
    store: SessionStore,
    events: EventWriter,
    models: ModelRegistry,
    image_model: Option<String>,
    providers: EditProviderRegistry,
    provider_options: Map<String, Value>,
    last_fallback_reason: Option<String>,
}

impl EditorEngine {
    pub fn open(
        state_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        image_model: Option<String>,
    ) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(events_path.into(), session_id.clone());
        let store = SessionStore::in_dir(&state_dir);
        let session = EditorSession::from_snapshot(store.load());
        log::debug!(
            "opened session {session_id} (slot {}, restored: {})",
            store.path().display(),
            session.is_loaded()
        );

        let engine = Self {
            state_dir,
            session_id,
            session,
            store,
            events,
            models: ModelRegistry::new(None),
            image_model,
            providers: default_provider_registry(),
            provider_options: Map::new(),
            last_fallback_reason: None,
        };
        engine.emit(
            EventKind::SessionOpened,
            json!({
                "state_dir": engine.state_dir.to_string_lossy(),
                "restored": engine.session.is_loaded(),
                "history_len": engine.session.history().len(),
                "history_index": engine.session.history().index(),
            }),
        );
        Ok(engine)
    }

    pub fn with_providers(mut self, providers: EditProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn events_path(&self) -> &Path {
        self.events.path()
    }

    pub fn image_model(&self) -> Option<&str> {
        self.image_model.as_deref()
    }

    pub fn set_provider_option(&mut self, key: impl Into<String>, value: Value) {
        self.provider_options.insert(key.into(), value);
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.last_fallback_reason.as_deref()
    }

    pub fn upload(&mut self, path: &Path) -> Result<(), EditorError> {
        if self.session.is_busy() {
            return Err(EditorError::Busy);
        }
        let image = self.track(upload::read_image_file(path))?;
        self.load_image(image)?;
        log::info!("uploaded {}", path.display());
        Ok(())
    }

    /// Makes `image` the new base image.
    pub fn load_image(&mut self, image: ImageState) -> Result<(), EditorError> {
        let mime_type = image.mime_type.clone();
        let fingerprint = image.original_image.as_deref().map(fingerprint);
        let result = self.session.load_image(image);
        self.track(result)?;
        self.persist();
        self.emit(
            EventKind::ImageUploaded,
            json!({ "mime_type": mime_type, "fingerprint": fingerprint }),
        );
        Ok(())
    }

    /// Validates a free-text edit and enters the busy state. The returned job must be run and
    /// handed back to [`EditorEngine::finish_edit`].
    pub fn start_prompt_edit(&mut self, prompt: &str) -> Result<EditJob, EditorError> {
        if self.session.is_busy() {
            return Err(EditorError::Busy);
        }
        let instruction = self.track(orchestrator::prompt_instruction(
            prompt,
            self.session.enhance_quality(),
        ))?;
        self.start_edit(instruction, "prompt")
    }

    pub fn start_blur_edit(&mut self) -> Result<EditJob, EditorError> {
        let instruction = orchestrator::blur_instruction(self.session.blur_intensity());
        self.start_edit(instruction, "blur")
    }

    fn start_edit(&mut self, instruction: String, kind: &str) -> Result<EditJob, EditorError> {
        let begun = self.session.begin_edit();
        self.track(begun)?;

        let source = self
            .session
            .effective_image()
            .map(DataUri::parse)
            .transpose()
            .ok()
            .flatten();
        let Some(source) = source else {
            return Err(self.fail_edit("Invalid image data URL.".to_string()));
        };
        let selection = match self.models.select_edit_model(self.image_model.as_deref()) {
            Ok(selection) => selection,
            Err(message) => return Err(self.fail_edit(message)),
        };
        if let Some(reason) = selection.fallback_reason.as_deref() {
            log::debug!("model fallback: {reason}");
        }
        self.last_fallback_reason = selection.fallback_reason.clone();
        let Some(provider) = self.providers.get(&selection.model.provider) else {
            let message = format!("No provider registered for '{}'.", selection.model.provider);
            return Err(self.fail_edit(message));
        };

        let job = orchestrator::EditJob::new(
            instruction,
            selection.model.name.clone(),
            source,
            provider,
            self.provider_options.clone(),
        );
        self.emit(
            EventKind::EditStarted,
            json!({
                "job_id": job.id,
                "kind": kind,
                "instruction": job.instruction,
                "model": job.model,
                "provider": job.provider_name,
                "fallback_reason": selection.fallback_reason,
                "source_mime_type": job.source_mime_type(),
                "history_index": self.session.history().index(),
            }),
        );
        Ok(job)
    }

    /// Applies a finished job: success appends to the history, failure records the message
    /// and leaves the history untouched.
    pub fn finish_edit(&mut self, outcome: EditOutcome) -> Result<EditResult, EditorError> {
        let elapsed_s = outcome.elapsed.as_secs_f64();
        match outcome.result {
            Ok(result) => {
                self.session.finish_edit(Ok(result.data_uri.clone()));
                self.persist();
                for warning in &result.warnings {
                    log::warn!("edit {}: {warning}", outcome.job_id);
                }
                self.emit(
                    EventKind::EditCompleted,
                    json!({
                        "job_id": outcome.job_id,
                        "mime_type": result.mime_type,
                        "fingerprint": fingerprint(&result.data_uri),
                        "history_len": self.session.history().len(),
                        "history_index": self.session.history().index(),
                        "elapsed_s": elapsed_s,
                        "warnings": result.warnings,
                    }),
                );
                log::info!("edit {} completed in {elapsed_s:.2}s", outcome.job_id);
                Ok(result)
            }
            Err(detail) => {
                let err = EditorError::EditFailed(detail.clone());
                self.session.finish_edit(Err(err.to_string()));
                self.emit(
                    EventKind::EditFailed,
                    json!({
                        "job_id": outcome.job_id,
                        "error": detail,
                        "elapsed_s": elapsed_s,
                    }),
                );
                log::info!("edit {} failed: {detail}", outcome.job_id);
                Err(err)
            }
        }
    }

    /// Runs a free-text edit to completion on the calling thread.
    pub fn edit(&mut self, prompt: &str) -> Result<EditResult, EditorError> {
        let job = self.start_prompt_edit(prompt)?;
        self.finish_edit(job.run())
    }

    pub fn blur_background(&mut self) -> Result<EditResult, EditorError> {
        let job = self.start_blur_edit()?;
        self.finish_edit(job.run())
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let result = self.session.undo();
        let moved = self.track(result)?;
        self.after_history_move("undo", moved);
        Ok(moved)
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let result = self.session.redo();
        let moved = self.track(result)?;
        self.after_history_move("redo", moved);
        Ok(moved)
    }

    fn after_history_move(&mut self, direction: &str, moved: bool) {
        if !moved {
            return;
        }
        self.persist();
        self.emit(
            EventKind::HistoryMoved,
            json!({
                "direction": direction,
                "history_index": self.session.history().index(),
                "history_len": self.session.history().len(),
            }),
        );
    }

    /// Crops the uploaded base image into a new base image; edits are discarded. `None` uses
    /// the centred default.
    pub fn crop(&mut self, rect: Option<CropRect>, pixel_ratio: f64) -> Result<(), EditorError> {
        if self.session.is_busy() {
            return Err(EditorError::Busy);
        }
        let Some(source) = self.session.original_image().map(str::to_string) else {
            return Err(self.track_err(EditorError::NoImage));
        };
        let cropped = self.track(crop::crop_data_uri(&source, rect, pixel_ratio))?;
        let fingerprint = cropped.original_image.as_deref().map(fingerprint);
        let applied = self.session.apply_crop(cropped);
        self.track(applied)?;
        self.persist();
        self.emit(
            EventKind::CropApplied,
            json!({
                "rect": rect.map(|rect| [rect.x, rect.y, rect.width, rect.height]),
                "pixel_ratio": pixel_ratio,
                "fingerprint": fingerprint,
            }),
        );
        Ok(())
    }

    pub fn set_active_filter(&mut self, filter: FilterType) -> Result<(), EditorError> {
        let result = self.session.set_active_filter(filter);
        self.track(result)?;
        self.persist();
        self.emit(EventKind::FilterChanged, json!({ "filter": filter.as_str() }));
        Ok(())
    }

    pub fn set_enhance_quality(&mut self, enabled: bool) -> Result<(), EditorError> {
        let result = self.session.set_enhance_quality(enabled);
        self.track(result)?;
        self.persist();
        self.emit(EventKind::EnhanceChanged, json!({ "enhance_quality": enabled }));
        Ok(())
    }

    /// Blur intensity only lives as long as the session; it is not written to the slot.
    pub fn set_blur_intensity(&mut self, intensity: BlurIntensity) -> Result<(), EditorError> {
        let result = self.session.set_blur_intensity(intensity);
        self.track(result)
    }

    /// Writes the effective image to `out_dir`. With `bake_filter` the active filter is applied
    /// to the pixels.
    pub fn download(&mut self, out_dir: &Path, bake_filter: bool) -> Result<PathBuf, EditorError> {
        let Some(source) = self.session.effective_image().map(str::to_string) else {
            return Err(self.track_err(EditorError::NoImage));
        };
        let filter = if bake_filter {
            self.session.active_filter()
        } else {
            FilterType::None
        };
        let millis = chrono::Utc::now().timestamp_millis();
        let path = self.track(export::export_png(&source, out_dir, filter, millis))?;
        self.emit(
            EventKind::ImageExported,
            json!({
                "path": path.to_string_lossy(),
                "filter": filter.as_str(),
            }),
        );
        log::info!("exported {}", path.display());
        Ok(path)
    }

    /// Returns to the empty state and removes the slot.
    pub fn reset(&mut self) -> Result<(), EditorError> {
        let result = self.session.reset();
        self.track(result)?;
        if let Err(err) = self.store.clear() {
            log::warn!("failed to remove session slot: {err:#}");
        }
        self.last_fallback_reason = None;
        self.emit(EventKind::SessionReset, json!({}));
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let history = self.session.history();
        SessionStatus {
            loaded: self.session.is_loaded(),
            mime_type: self
                .session
                .is_loaded()
                .then(|| self.session.image().mime_type.clone()),
            history_len: history.len(),
            history_index: history.index(),
            can_undo: history.can_undo(),
            can_redo: history.can_redo(),
            showing_original: history.current().is_none(),
            enhance_quality: self.session.enhance_quality(),
            blur_intensity: self.session.blur_intensity(),
            active_filter: self.session.active_filter(),
            busy: self.session.is_busy(),
            error: self.session.error().map(str::to_string),
            image_model: self.image_model.clone(),
            slot_path: self.store.path().to_path_buf(),
        }
    }

    /// Records user-facing failures as the session error. A busy rejection leaves the error of
    /// the running edit alone.
    fn track<T>(&mut self, result: Result<T, EditorError>) -> Result<T, EditorError> {
        result.map_err(|err| self.track_err(err))
    }

    fn track_err(&mut self, err: EditorError) -> EditorError {
        if !matches!(err, EditorError::Busy) {
            self.session.set_error(err.to_string());
        }
        err
    }

    fn fail_edit(&mut self, detail: String) -> EditorError {
        let err = EditorError::EditFailed(detail.clone());
        self.session.finish_edit(Err(err.to_string()));
        self.emit(EventKind::EditFailed, json!({ "error": detail }));
        err
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.session.snapshot()) {
            log::warn!(
                "failed to save session slot {}: {err:#}",
                self.store.path().display()
            );
        }
    }

    fn emit(&self, kind: EventKind, payload: Value) {
        if let Err(err) = self.events.emit(kind, map_object(payload)) {
            log::warn!("failed to write {kind} event: {err:#}");
        }
    }
}

/// Short content hash used to tell images apart in the event log.
fn fingerprint(data_uri: &str) -> String {
    let digest = Sha256::digest(data_uri.as_bytes());
    hex::encode(&digest[..8])
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}
