use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::Result;
use retouch_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use retouch_contracts::session::{BlurIntensity, FilterType};
use retouch_engine::{CropRect, EditJob, EditOutcome, EditorEngine, EditorError};
use serde_json::Value;

use crate::{format_status, on_off, parse_toggle, print_edit_result, print_history_move};

/// At most one edit runs at a time; its outcome is joined back and applied on the REPL
/// thread.
struct ChatLoop<'a> {
    engine: &'a mut EditorEngine,
    worker: Option<EditWorker>,
}

struct EditWorker {
    job_id: String,
    instruction: String,
    started: Instant,
    handle: JoinHandle<EditOutcome>,
}

impl EditWorker {
    /// A panicking worker still yields a failed outcome, so the session leaves the busy state.
    fn join(self) -> EditOutcome {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|message| message.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::warn!("edit worker {} panicked: {detail}", self.job_id);
                EditOutcome {
                    job_id: self.job_id,
                    instruction: self.instruction,
                    elapsed: self.started.elapsed(),
                    result: Err(format!("edit worker panicked: {detail}")),
                }
            }
        }
    }
}

pub(crate) fn run_chat(engine: &mut EditorEngine) -> Result<()> {
    let mut chat = ChatLoop::new(engine);

    let stdin = io::stdin();
    let mut line = String::new();
    println!("Retouch chat started. Type /help for commands.");
    if chat.engine.session().is_loaded() {
        println!("Restored previous session.");
    }

    loop {
        chat.apply_finished();
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "noop" {
            continue;
        }
        chat.apply_finished();
        if let Err(err) = chat.dispatch(&intent) {
            println!("{err}");
        }
    }

    chat.wait();
    Ok(())
}

impl<'a> ChatLoop<'a> {
    fn new(engine: &'a mut EditorEngine) -> Self {
        Self {
            engine,
            worker: None,
        }
    }

    fn dispatch(&mut self, intent: &Intent) -> Result<(), EditorError> {
        match intent.action.as_str() {
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            "status" => {
                for line in format_status(&self.engine.status()) {
                    println!("{line}");
                }
            }
            "wait" => {
                if self.worker.is_some() {
                    self.wait();
                } else {
                    println!("No edit in progress.");
                }
            }
            "edit" => {
                let prompt = intent.prompt.as_deref().unwrap_or_default();
                let job = self.engine.start_prompt_edit(prompt)?;
                self.spawn(job);
            }
            "blur" => {
                if let Some(value) = intent.arg_str("value") {
                    self.engine.set_blur_intensity(parse_keyword(value, BlurIntensity::parse)?)?;
                }
                let job = self.engine.start_blur_edit()?;
                self.spawn(job);
            }
            "set_blur_intensity" => {
                let Some(value) = intent.arg_str("value") else {
                    println!("/intensity requires low, medium or high");
                    return Ok(());
                };
                let intensity = parse_keyword(value, BlurIntensity::parse)?;
                self.engine.set_blur_intensity(intensity)?;
                println!("Blur intensity set to {intensity}");
            }
            "set_filter" => {
                let Some(value) = intent.arg_str("value") else {
                    println!("/filter requires one of none, grayscale, sepia, invert");
                    return Ok(());
                };
                let filter = parse_keyword(value, FilterType::parse)?;
                self.engine.set_active_filter(filter)?;
                println!("Filter set to {filter}");
            }
            "set_enhance" => {
                let enabled = match intent.arg_str("value") {
                    Some(value) => parse_toggle(value).map_err(EditorError::InvalidArgument)?,
                    None => !self.engine.session().enhance_quality(),
                };
                self.engine.set_enhance_quality(enabled)?;
                println!("Quality enhance {}", on_off(enabled));
            }
            "upload" => {
                let Some(path) = intent.arg_str("path") else {
                    println!("/upload requires a path");
                    return Ok(());
                };
                let path = PathBuf::from(path);
                self.engine.upload(&path)?;
                println!(
                    "Loaded {} ({})",
                    path.display(),
                    self.engine.session().image().mime_type
                );
            }
            "download" => {
                let out_dir = PathBuf::from(intent.arg_str("path").unwrap_or("."));
                let path = self.engine.download(&out_dir, false)?;
                println!("Saved {}", path.display());
            }
            "crop" => {
                if let Some(error) = intent.arg_str("error") {
                    println!("{error}");
                    return Ok(());
                }
                let rect = crop_rect_from_intent(intent)?;
                self.engine.crop(rect, 1.0)?;
                println!("Cropped; history cleared.");
            }
            "undo" => {
                let moved = self.engine.undo()?;
                print_history_move(self.engine, "Undo", moved);
            }
            "redo" => {
                let moved = self.engine.redo()?;
                print_history_move(self.engine, "Redo", moved);
            }
            "reset" => {
                self.engine.reset()?;
                println!("Session cleared.");
            }
            "unknown" => {
                let command = intent.arg_str("command").unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
            other => log::debug!("ignoring chat action {other}"),
        }
        Ok(())
    }

    fn spawn(&mut self, job: EditJob) {
        println!("Editing with {} (/wait to block until done)...", job.model);
        self.worker = Some(EditWorker {
            job_id: job.id.clone(),
            instruction: job.instruction.clone(),
            started: Instant::now(),
            handle: thread::spawn(move || job.run()),
        });
    }

    /// Applies an edit that has already finished, without blocking.
    fn apply_finished(&mut self) {
        if self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.handle.is_finished())
        {
            self.wait();
        }
    }

    fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.apply(worker.join());
        }
    }

    fn apply(&mut self, outcome: EditOutcome) {
        match self.engine.finish_edit(outcome) {
            Ok(result) => print_edit_result(self.engine, &result),
            Err(err) => println!("{err}"),
        }
    }
}

fn parse_keyword<T>(value: &str, parse: fn(&str) -> Option<T>) -> Result<T, EditorError> {
    parse(value).ok_or_else(|| EditorError::InvalidArgument(format!("unknown value '{value}'")))
}

/// An empty or missing rect selects the default crop; anything else must be four numbers.
fn crop_rect_from_intent(intent: &Intent) -> Result<Option<CropRect>, EditorError> {
    let items: &[Value] = match intent.command_args.get("rect") {
        None => return Ok(None),
        Some(Value::Array(items)) if items.is_empty() => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => &[],
    };
    let values: Option<Vec<f64>> = items.iter().map(|item| item.as_f64()).collect();
    match values.as_deref() {
        Some(&[x, y, width, height]) => CropRect::new(x, y, width, height).map(Some),
        _ => Err(EditorError::InvalidCrop(
            "expected four numbers: x y width height".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use retouch_contracts::chat::parse_intent;
    use retouch_contracts::image::ImageState;
    use retouch_contracts::session::BlurIntensity;
    use retouch_engine::{
        CropRect, EditProvider, EditProviderRegistry, EditRequest, EditedImage, EditorEngine,
        EditorError,
    };
    use serde_json::{json, Value};

    use super::{crop_rect_from_intent, parse_keyword, ChatLoop};

    struct PanickingProvider;

    impl EditProvider for PanickingProvider {
        fn name(&self) -> &str {
            "dryrun"
        }

        fn edit(&self, _request: &EditRequest) -> anyhow::Result<EditedImage> {
            panic!("decoder exploded")
        }
    }

    #[test]
    fn panicking_worker_fails_the_edit_and_frees_the_session() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut providers = EditProviderRegistry::new();
        providers.register(PanickingProvider);
        let mut engine = EditorEngine::open(
            temp.path(),
            temp.path().join("events.jsonl"),
            Some("dryrun-edit-1".to_string()),
        )?
        .with_providers(providers);
        engine.load_image(ImageState::new("data:image/png;base64,AAAA", "image/png"))?;

        {
            let mut chat = ChatLoop::new(&mut engine);
            chat.dispatch(&parse_intent("add a hat"))?;
            assert!(chat.engine.session().is_busy());
            chat.wait();
            assert!(chat.worker.is_none());
        }

        assert!(!engine.session().is_busy());
        assert!(engine.session().history().is_empty());
        assert!(engine
            .session()
            .error()
            .unwrap_or_default()
            .contains("edit worker panicked: decoder exploded"));
        assert!(engine.undo().is_ok());
        Ok(())
    }

    #[test]
    fn wait_without_an_edit_returns_immediately() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut engine = EditorEngine::open(temp.path(), temp.path().join("events.jsonl"), None)?;
        let mut chat = ChatLoop::new(&mut engine);
        chat.wait();
        chat.apply_finished();
        assert!(chat.worker.is_none());
        Ok(())
    }

    #[test]
    fn crop_intent_with_percentages_builds_rect() -> anyhow::Result<()> {
        let rect = crop_rect_from_intent(&parse_intent("/crop 10% 10% 50% 50%"))?;
        assert_eq!(rect, Some(CropRect::new(0.1, 0.1, 0.5, 0.5)?));
        Ok(())
    }

    #[test]
    fn bare_crop_uses_default_rect() -> anyhow::Result<()> {
        assert_eq!(crop_rect_from_intent(&parse_intent("/crop"))?, None);
        Ok(())
    }

    #[test]
    fn malformed_rect_is_an_error_not_the_default_crop() {
        let mut intent = parse_intent("/crop");
        intent
            .command_args
            .insert("rect".to_string(), json!([Value::Null, 0.0, 0.5, 0.5]));
        assert!(matches!(
            crop_rect_from_intent(&intent),
            Err(EditorError::InvalidCrop(_))
        ));
        intent
            .command_args
            .insert("rect".to_string(), json!([0.0, 0.0, 0.5]));
        assert!(matches!(
            crop_rect_from_intent(&intent),
            Err(EditorError::InvalidCrop(_))
        ));
    }

    #[test]
    fn non_finite_crop_never_reaches_the_default() {
        let intent = parse_intent("/crop nan 0 0.5 0.5");
        assert!(intent.arg_str("error").is_some());
        assert!(crop_rect_from_intent(&intent).is_ok_and(|rect| rect.is_none()));
    }

    #[test]
    fn out_of_bounds_crop_is_rejected() {
        assert!(matches!(
            crop_rect_from_intent(&parse_intent("/crop 0.8 0 0.5 0.5")),
            Err(EditorError::InvalidCrop(_))
        ));
    }

    #[test]
    fn keyword_values_are_validated() {
        assert!(matches!(
            parse_keyword("high", BlurIntensity::parse),
            Ok(BlurIntensity::High)
        ));
        assert!(matches!(
            parse_keyword("extreme", BlurIntensity::parse),
            Err(EditorError::InvalidArgument(message)) if message == "unknown value 'extreme'"
        ));
    }
}
