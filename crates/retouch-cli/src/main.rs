mod chat;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use retouch_contracts::models::DEFAULT_EDIT_MODEL;
use retouch_contracts::session::{BlurIntensity, FilterType};
use retouch_engine::{
    CropRect, EditResult, EditorEngine, EditorError, ErrorKind, SessionStatus,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "retouch", version, about = "Prompt-driven photo editing sessions")]
struct Cli {
    /// Directory holding the session slot and default event log.
    #[arg(long, global = true, default_value = ".retouch")]
    state_dir: PathBuf,
    #[arg(long, global = true, env = "RETOUCH_IMAGE_MODEL", default_value = DEFAULT_EDIT_MODEL)]
    model: String,
    /// Event log path. Defaults to `<state-dir>/events.jsonl`.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Provider request timeout in seconds.
    #[arg(long, global = true)]
    request_timeout: Option<f64>,
    #[arg(long, global = true)]
    transport_retries: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a PNG, JPEG or WEBP file as the new base image.
    Upload { path: PathBuf },
    /// Edit the current image with a free-text instruction.
    Edit {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Blur the background while keeping the subject sharp.
    Blur {
        #[arg(long, value_parser = parse_intensity)]
        intensity: Option<BlurIntensity>,
    },
    Undo,
    Redo,
    /// Crop the current image into a new base image.
    Crop(CropArgs),
    /// Set the display filter of the edited image.
    Filter {
        #[arg(value_parser = parse_filter)]
        name: FilterType,
    },
    /// Prefix free-text edits with a quality enhancement request.
    Enhance {
        #[arg(action = clap::ArgAction::Set, value_parser = parse_toggle)]
        state: bool,
    },
    /// Export the current image as a PNG.
    Download {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Bake the active filter into the exported pixels.
        #[arg(long)]
        apply_filter: bool,
    },
    /// Clear the session and remove its slot.
    Reset,
    Status,
    /// Interactive session with slash commands.
    Chat,
}

/// Fractions of the image size; omit all four for a centred square.
#[derive(Debug, Args)]
struct CropArgs {
    #[arg(long, requires_all = ["y", "width", "height"])]
    x: Option<f64>,
    #[arg(long, requires_all = ["x", "width", "height"])]
    y: Option<f64>,
    #[arg(long, requires_all = ["x", "y", "height"])]
    width: Option<f64>,
    #[arg(long, requires_all = ["x", "y", "width"])]
    height: Option<f64>,
    #[arg(long, default_value_t = 1.0)]
    pixel_ratio: f64,
}

impl CropArgs {
    fn rect(&self) -> Result<Option<CropRect>, EditorError> {
        match (self.x, self.y, self.width, self.height) {
            (Some(x), Some(y), Some(width), Some(height)) => {
                CropRect::new(x, y, width, height).map(Some)
            }
            _ => Ok(None),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retouch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let events_path = cli
        .events
        .clone()
        .unwrap_or_else(|| cli.state_dir.join("events.jsonl"));
    let mut engine = EditorEngine::open(&cli.state_dir, events_path, Some(cli.model.clone()))?;
    if let Some(timeout) = cli.request_timeout {
        engine.set_provider_option("request_timeout", Value::from(timeout));
    }
    if let Some(retries) = cli.transport_retries {
        engine.set_provider_option("transport_retries", Value::from(retries));
    }

    if let Command::Chat = cli.command {
        chat::run_chat(&mut engine)?;
        return Ok(0);
    }
    match run_command(&mut engine, cli.command) {
        Ok(()) => Ok(0),
        Err(err) => {
            eprintln!("retouch: {err}");
            Ok(exit_code(&err))
        }
    }
}

/// Scripts can tell a rejected request from a disk or API failure; 1 is left for crashes.
fn exit_code(err: &EditorError) -> i32 {
    match err.kind() {
        ErrorKind::Input => 2,
        ErrorKind::Io => 3,
        ErrorKind::Api => 4,
    }
}

fn run_command(engine: &mut EditorEngine, command: Command) -> Result<(), EditorError> {
    match command {
        Command::Upload { path } => {
            engine.upload(&path)?;
            println!("Loaded {} ({})", path.display(), engine.session().image().mime_type);
        }
        Command::Edit { prompt } => {
            let result = engine.edit(&prompt.join(" "))?;
            print_edit_result(engine, &result);
        }
        Command::Blur { intensity } => {
            if let Some(intensity) = intensity {
                engine.set_blur_intensity(intensity)?;
            }
            let result = engine.blur_background()?;
            print_edit_result(engine, &result);
        }
        Command::Undo => {
            let moved = engine.undo()?;
            print_history_move(engine, "Undo", moved);
        }
        Command::Redo => {
            let moved = engine.redo()?;
            print_history_move(engine, "Redo", moved);
        }
        Command::Crop(args) => {
            engine.crop(args.rect()?, args.pixel_ratio)?;
            println!("Cropped; history cleared.");
        }
        Command::Filter { name } => {
            engine.set_active_filter(name)?;
            println!("Filter set to {name}");
        }
        Command::Enhance { state } => {
            engine.set_enhance_quality(state)?;
            println!("Quality enhance {}", on_off(state));
        }
        Command::Download {
            out_dir,
            apply_filter,
        } => {
            let path = engine.download(&out_dir, apply_filter)?;
            println!("Saved {}", path.display());
        }
        Command::Reset => {
            engine.reset()?;
            println!("Session cleared.");
        }
        Command::Status => {
            for line in format_status(&engine.status()) {
                println!("{line}");
            }
        }
        Command::Chat => {}
    }
    Ok(())
}

fn print_edit_result(engine: &EditorEngine, result: &EditResult) {
    let history = engine.session().history();
    println!(
        "Edit applied ({}); showing {}/{}",
        result.mime_type,
        history.index() + 1,
        history.len()
    );
    if let Some(reason) = engine.last_fallback_reason() {
        println!("Model: {reason}");
    }
    for warning in &result.warnings {
        println!("Warning: {warning}");
    }
}

fn print_history_move(engine: &EditorEngine, label: &str, moved: bool) {
    if !moved {
        println!("{label}: nothing to do");
        return;
    }
    let history = engine.session().history();
    if history.index() < 0 {
        println!("{label}: showing original");
    } else {
        println!("{label}: showing {}/{}", history.index() + 1, history.len());
    }
}

fn format_status(status: &SessionStatus) -> Vec<String> {
    if !status.loaded {
        return vec![
            "No image loaded.".to_string(),
            format!("Slot: {}", status.slot_path.display()),
        ];
    }
    let position = if status.showing_original {
        format!("original ({} edits)", status.history_len)
    } else {
        format!("edit {}/{}", status.history_index + 1, status.history_len)
    };
    let mut lines = vec![
        format!(
            "Image: {}",
            status.mime_type.as_deref().unwrap_or("unknown type")
        ),
        format!(
            "Showing: {position} (undo: {}, redo: {})",
            yes_no(status.can_undo),
            yes_no(status.can_redo)
        ),
        format!(
            "Enhance: {}  Blur: {}  Filter: {}",
            on_off(status.enhance_quality),
            status.blur_intensity,
            status.active_filter
        ),
    ];
    if let Some(model) = status.image_model.as_deref() {
        lines.push(format!("Model: {model}"));
    }
    if status.busy {
        lines.push("Editing...".to_string());
    }
    if let Some(error) = status.error.as_deref() {
        lines.push(format!("Error: {error}"));
    }
    lines.push(format!("Slot: {}", status.slot_path.display()));
    lines
}

fn parse_intensity(raw: &str) -> Result<BlurIntensity, String> {
    BlurIntensity::parse(raw).ok_or_else(|| format!("unknown blur intensity '{raw}'"))
}

fn parse_filter(raw: &str) -> Result<FilterType, String> {
    FilterType::parse(raw).ok_or_else(|| {
        let names: Vec<&str> = FilterType::ALL.iter().map(|filter| filter.as_str()).collect();
        format!("unknown filter '{raw}' (expected {})", names.join(", "))
    })
}

pub(crate) fn parse_toggle(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use retouch_contracts::session::{BlurIntensity, FilterType};
    use retouch_engine::{EditorError, SessionStatus};

    use super::{exit_code, format_status, parse_toggle, Cli, Command};

    fn loaded_status() -> SessionStatus {
        SessionStatus {
            loaded: true,
            mime_type: Some("image/jpeg".to_string()),
            history_len: 3,
            history_index: 1,
            can_undo: true,
            can_redo: true,
            showing_original: false,
            enhance_quality: true,
            blur_intensity: BlurIntensity::High,
            active_filter: FilterType::Sepia,
            busy: false,
            error: Some("Please enter an editing prompt.".to_string()),
            image_model: None,
            slot_path: PathBuf::from(".retouch/aiPhotoEditorSession.json"),
        }
    }

    #[test]
    fn status_lines_describe_position_and_flags() {
        let lines = format_status(&loaded_status());
        assert_eq!(lines[0], "Image: image/jpeg");
        assert_eq!(lines[1], "Showing: edit 2/3 (undo: yes, redo: yes)");
        assert_eq!(lines[2], "Enhance: on  Blur: high  Filter: sepia");
        assert!(lines.contains(&"Error: Please enter an editing prompt.".to_string()));
    }

    #[test]
    fn status_for_empty_session_is_short() {
        let status = SessionStatus {
            loaded: false,
            mime_type: None,
            history_len: 0,
            history_index: -1,
            can_undo: false,
            can_redo: false,
            showing_original: true,
            error: None,
            ..loaded_status()
        };
        assert_eq!(format_status(&status)[0], "No image loaded.");
        assert_eq!(format_status(&status).len(), 2);
    }

    #[test]
    fn toggle_accepts_common_spellings() {
        assert_eq!(parse_toggle("ON"), Ok(true));
        assert_eq!(parse_toggle("off"), Ok(false));
        assert!(parse_toggle("maybe").is_err());
    }

    #[test]
    fn edit_joins_prompt_words() {
        let cli = Cli::try_parse_from(["retouch", "edit", "add", "a", "hat"]);
        let Ok(Cli {
            command: Command::Edit { prompt },
            ..
        }) = cli
        else {
            panic!("edit command did not parse");
        };
        assert_eq!(prompt.join(" "), "add a hat");
    }

    #[test]
    fn crop_requires_all_four_values() {
        assert!(Cli::try_parse_from(["retouch", "crop", "--x", "0.1"]).is_err());
        let cli = Cli::try_parse_from([
            "retouch", "crop", "--x", "0", "--y", "0", "--width", "0.5", "--height", "0.5",
        ]);
        assert!(matches!(cli, Ok(Cli { command: Command::Crop(_), .. })));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["retouch", "status", "--state-dir", "/tmp/session"]);
        assert!(matches!(
            cli,
            Ok(Cli { ref state_dir, command: Command::Status, .. })
                if state_dir.as_path() == std::path::Path::new("/tmp/session")
        ));
    }

    #[test]
    fn unknown_filter_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["retouch", "filter", "vintage"]).is_err());
        assert!(Cli::try_parse_from(["retouch", "filter", "sepia"]).is_ok());
    }

    #[test]
    fn exit_code_reflects_the_error_class() {
        assert_eq!(exit_code(&EditorError::Busy), 2);
        assert_eq!(exit_code(&EditorError::InvalidCrop("too wide".to_string())), 2);
        assert_eq!(exit_code(&EditorError::ExportFailed("disk full".to_string())), 3);
        assert_eq!(exit_code(&EditorError::EditFailed("quota".to_string())), 4);
    }
}
