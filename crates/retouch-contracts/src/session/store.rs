use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::record::{SessionRecord, SessionSnapshot, SESSION_SLOT_NAME};

/// The single durable slot holding the serialized session.
///
/// Loading never fails: a missing slot is an empty session, and a slot that cannot be read or
/// parsed is logged, removed, and treated as empty.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{SESSION_SLOT_NAME}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> SessionSnapshot {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return SessionSnapshot::default(),
            Err(err) => {
                log::warn!(
                    "failed to read session slot {}: {err}",
                    self.path.display()
                );
                self.discard();
                return SessionSnapshot::default();
            }
        };

        let record = match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => record,
            Err(err) => {
                log::warn!(
                    "failed to parse session slot {}: {err}",
                    self.path.display()
                );
                self.discard();
                return SessionSnapshot::default();
            }
        };

        match SessionSnapshot::from_record(record) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => SessionSnapshot::default(),
            Err(reason) => {
                log::warn!(
                    "discarding malformed session slot {}: {reason}",
                    self.path.display()
                );
                self.discard();
                SessionSnapshot::default()
            }
        }
    }

    /// Writes the snapshot, or removes the slot when no image is loaded.
    pub fn save(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let Some(record) = snapshot.to_record() else {
            return self.clear();
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string(&record)?)?;
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn discard(&self) {
        if let Err(err) = self.clear() {
            log::warn!(
                "failed to remove session slot {}: {err}",
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::history::EditHistory;
    use crate::image::ImageState;
    use crate::session::{FilterType, SessionSnapshot};

    use super::SessionStore;

    fn loaded_snapshot() -> SessionSnapshot {
        let mut history = EditHistory::new();
        history.append("data:image/png;base64,Qg==".to_string());
        history.append("data:image/png;base64,Qw==".to_string());
        history.undo();
        SessionSnapshot {
            image: ImageState::new("data:image/jpeg;base64,QQ==", "image/jpeg"),
            history,
            enhance_quality: true,
            active_filter: FilterType::Sepia,
        }
    }

    #[test]
    fn save_then_load_restores_snapshot() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SessionStore::in_dir(temp.path());
        let snapshot = loaded_snapshot();
        store.save(&snapshot)?;
        assert!(store.exists());
        assert_eq!(store.load(), snapshot);
        Ok(())
    }

    #[test]
    fn slot_file_uses_session_key_name() {
        let store = SessionStore::in_dir("/tmp/state");
        assert_eq!(
            store.path().file_name().and_then(|name| name.to_str()),
            Some("aiPhotoEditorSession.json")
        );
    }

    #[test]
    fn missing_slot_loads_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SessionStore::in_dir(temp.path().join("nested"));
        assert_eq!(store.load(), SessionSnapshot::default());
        Ok(())
    }

    #[test]
    fn malformed_text_loads_empty_and_discards_slot() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SessionStore::in_dir(temp.path());
        for raw in [
            "{not json",
            "[1, 2, 3]",
            r#"{"savedImageState": 42}"#,
            r#"{"savedImageState": {"originalImage": "data:image/png;base64,QQ==", "mimeType": "image/png"}, "savedActiveFilter": "vintage"}"#,
            r#"{"savedImageState": {"originalImage": "data:image/png;base64,QQ==", "mimeType": "image/png"}, "savedHistory": [], "savedHistoryIndex": 0}"#,
        ] {
            std::fs::write(store.path(), raw)?;
            assert_eq!(store.load(), SessionSnapshot::default(), "{raw}");
            assert!(!store.exists(), "slot kept for {raw}");
        }
        Ok(())
    }

    #[test]
    fn slot_without_image_loads_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SessionStore::in_dir(temp.path());
        std::fs::write(store.path(), "{}")?;
        assert_eq!(store.load(), SessionSnapshot::default());
        Ok(())
    }

    #[test]
    fn saving_without_image_removes_slot() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SessionStore::in_dir(temp.path());
        store.save(&loaded_snapshot())?;
        store.save(&SessionSnapshot::default())?;
        assert!(!store.exists());
        Ok(())
    }

    #[test]
    fn clear_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = SessionStore::in_dir(temp.path());
        store.save(&loaded_snapshot())?;
        store.clear()?;
        store.clear()?;
        assert!(!store.exists());
        Ok(())
    }
}
