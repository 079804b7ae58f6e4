use retouch_contracts::history::EditHistory;
use retouch_contracts::image::ImageState;
use retouch_contracts::session::{BlurIntensity, FilterType, SessionSnapshot};

use crate::error::EditorError;

/// All mutable editing state of one user session.
///
/// Every mutator refuses to run while an edit is in flight; that is the only concurrency
/// rule the session enforces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorSession {
    image: ImageState,
    history: EditHistory,
    enhance_quality: bool,
    blur_intensity: BlurIntensity,
    active_filter: FilterType,
    busy: bool,
    error: Option<String>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            image: snapshot.image,
            history: snapshot.history,
            enhance_quality: snapshot.enhance_quality,
            active_filter: snapshot.active_filter,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            image: self.image.clone(),
            history: self.history.clone(),
            enhance_quality: self.enhance_quality,
            active_filter: self.active_filter,
        }
    }

    pub fn image(&self) -> &ImageState {
        &self.image
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_loaded()
    }

    pub fn original_image(&self) -> Option<&str> {
        self.image
            .original_image
            .as_deref()
            .filter(|value| !value.is_empty())
    }

    /// The selected edit result, if any.
    pub fn edited_image(&self) -> Option<&str> {
        self.history.current()
    }

    /// What is currently shown and what the next edit operates on.
    pub fn effective_image(&self) -> Option<&str> {
        let original = self.original_image()?;
        Some(self.history.current_or(original))
    }

    pub fn enhance_quality(&self) -> bool {
        self.enhance_quality
    }

    pub fn blur_intensity(&self) -> BlurIntensity {
        self.blur_intensity
    }

    pub fn active_filter(&self) -> FilterType {
        self.active_filter
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Replaces the base image (upload) and resets everything derived from the old one.
    pub fn load_image(&mut self, image: ImageState) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.image = image;
        self.history.clear();
        self.error = None;
        self.enhance_quality = false;
        self.blur_intensity = BlurIntensity::default();
        self.active_filter = FilterType::None;
        Ok(())
    }

    /// A crop becomes the new base image; edit history and the filter do not survive it.
    pub fn apply_crop(&mut self, image: ImageState) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.ensure_loaded()?;
        self.image = image;
        self.history.clear();
        self.active_filter = FilterType::None;
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        self.ensure_idle()?;
        Ok(self.history.undo())
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        self.ensure_idle()?;
        Ok(self.history.redo())
    }

    pub fn set_enhance_quality(&mut self, enabled: bool) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.ensure_loaded()?;
        self.enhance_quality = enabled;
        Ok(())
    }

    pub fn set_blur_intensity(&mut self, intensity: BlurIntensity) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.ensure_loaded()?;
        self.blur_intensity = intensity;
        Ok(())
    }

    pub fn set_active_filter(&mut self, filter: FilterType) -> Result<(), EditorError> {
        self.ensure_idle()?;
        if self.edited_image().is_none() {
            return Err(EditorError::NoEditedImage);
        }
        self.active_filter = filter;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), EditorError> {
        self.ensure_idle()?;
        *self = Self::default();
        Ok(())
    }

    /// Enters the busy state for an edit. Fails if an edit is already running or no image is
    /// loaded.
    pub(crate) fn begin_edit(&mut self) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.ensure_loaded()?;
        self.busy = true;
        self.error = None;
        Ok(())
    }

    /// Leaves the busy state, appending `result` on success or recording the message on
    /// failure.
    pub(crate) fn finish_edit(&mut self, result: Result<String, String>) {
        self.busy = false;
        match result {
            Ok(data_uri) => self.history.append(data_uri),
            Err(message) => self.error = Some(message),
        }
    }

    fn ensure_idle(&self) -> Result<(), EditorError> {
        if self.busy {
            return Err(EditorError::Busy);
        }
        Ok(())
    }

    fn ensure_loaded(&self) -> Result<(), EditorError> {
        if !self.is_loaded() {
            return Err(EditorError::NoImage);
        }
        Ok(())
    }
}
