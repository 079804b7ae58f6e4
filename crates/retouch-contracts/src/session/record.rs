use serde::{Deserialize, Serialize};

use super::flags::FilterType;
use crate::history::EditHistory;
use crate::image::ImageState;

pub const SESSION_SLOT_NAME: &str = "aiPhotoEditorSession";

/// On-disk shape of the session slot. Every field is optional so older or partial slots
/// still parse; absent fields fall back to the empty-session defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_image_state: Option<ImageState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_history: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_history_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_enhance_quality: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_active_filter: Option<FilterType>,
}

/// The persistable part of an editing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub image: ImageState,
    pub history: EditHistory,
    pub enhance_quality: bool,
    pub active_filter: FilterType,
}

impl SessionSnapshot {
    pub fn has_image(&self) -> bool {
        self.image.is_loaded()
    }

    /// `None` when there is nothing worth persisting.
    pub fn to_record(&self) -> Option<SessionRecord> {
        if !self.has_image() {
            return None;
        }
        Some(SessionRecord {
            saved_image_state: Some(self.image.clone()),
            saved_history: Some(self.history.entries().to_vec()),
            saved_history_index: Some(self.history.index()),
            saved_enhance_quality: Some(self.enhance_quality),
            saved_active_filter: Some(self.active_filter),
        })
    }

    /// `Ok(None)` for a record without an image; `Err` when the record contradicts itself.
    pub fn from_record(record: SessionRecord) -> Result<Option<Self>, String> {
        let Some(image) = record.saved_image_state.filter(ImageState::is_loaded) else {
            return Ok(None);
        };
        let entries = record.saved_history.unwrap_or_default();
        let index = record.saved_history_index.unwrap_or(-1);
        let entry_count = entries.len();
        let history = EditHistory::from_parts(entries, index).ok_or_else(|| {
            format!("history index {index} out of range for {entry_count} entries")
        })?;
        Ok(Some(Self {
            image,
            history,
            enhance_quality: record.saved_enhance_quality.unwrap_or(false),
            active_filter: record.saved_active_filter.unwrap_or_default(),
        }))
    }
}
