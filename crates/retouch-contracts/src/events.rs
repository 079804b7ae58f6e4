use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Everything the session log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionOpened,
    ImageUploaded,
    EditStarted,
    EditCompleted,
    EditFailed,
    HistoryMoved,
    CropApplied,
    FilterChanged,
    EnhanceChanged,
    ImageExported,
    SessionReset,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SessionOpened => "session_opened",
            EventKind::ImageUploaded => "image_uploaded",
            EventKind::EditStarted => "edit_started",
            EventKind::EditCompleted => "edit_completed",
            EventKind::EditFailed => "edit_failed",
            EventKind::HistoryMoved => "history_moved",
            EventKind::CropApplied => "crop_applied",
            EventKind::FilterChanged => "filter_changed",
            EventKind::EnhanceChanged => "enhance_changed",
            EventKind::ImageExported => "image_exported",
            EventKind::SessionReset => "session_reset",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only JSONL log of one editing session.
///
/// Each line carries `type`, `session_id` and `ts` followed by the payload. Clones share the
/// file lock, so a writer can be handed to a worker thread.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one event and returns it. Payload keys never replace the envelope fields.
    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = EventPayload::new();
        event.insert("type".to_string(), Value::from(kind.as_str()));
        event.insert("session_id".to_string(), Value::from(self.session_id()));
        event.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        for (key, value) in payload {
            event.entry(key).or_insert(value);
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        if let Some(parent) = self.path().parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .shared
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path().display()))?;
        Ok(Value::Object(event))
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventKind, EventPayload, EventWriter};

    fn payload(value: Value) -> EventPayload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn event_line_has_envelope_and_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");

        let emitted = writer.emit(
            EventKind::ImageUploaded,
            payload(json!({ "mime_type": "image/png" })),
        )?;

        let content = std::fs::read_to_string(&path)?;
        let parsed: Value = serde_json::from_str(content.trim_end())?;
        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], "image_uploaded");
        assert_eq!(parsed["session_id"], "session-1");
        assert_eq!(parsed["mime_type"], "image/png");
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or_default())?;
        Ok(())
    }

    #[test]
    fn payload_cannot_replace_envelope() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-1");
        let emitted = writer.emit(
            EventKind::EditStarted,
            payload(json!({ "type": "spoofed", "session_id": "other", "job_id": "j1" })),
        )?;
        assert_eq!(emitted["type"], "edit_started");
        assert_eq!(emitted["session_id"], "session-1");
        assert_eq!(emitted["job_id"], "j1");
        Ok(())
    }

    #[test]
    fn clones_append_to_the_same_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("state").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");
        let worker = writer.clone();

        writer.emit(EventKind::HistoryMoved, EventPayload::new())?;
        std::thread::spawn(move || worker.emit(EventKind::EditCompleted, EventPayload::new()))
            .join()
            .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;

        let content = std::fs::read_to_string(&path)?;
        let types: Vec<String> = content
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(types, ["history_moved", "edit_completed"]);
        Ok(())
    }

    #[test]
    fn kinds_use_snake_case_names() {
        assert_eq!(EventKind::SessionReset.to_string(), "session_reset");
        assert_eq!(EventKind::EnhanceChanged.as_str(), "enhance_changed");
    }
}
