use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, CROP_COMMAND, KEYWORD_ARG_COMMANDS, NO_ARG_COMMANDS, PATH_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Crop numbers may be separated by spaces or commas and may carry a `%` suffix, in which
/// case they are read as percentages.
fn parse_crop_args(arg: &str) -> Result<Vec<f64>, String> {
    arg.replace(',', " ")
        .split_whitespace()
        .map(|token| {
            let (number, scale) = match token.strip_suffix('%') {
                Some(stripped) => (stripped, 100.0),
                None => (token, 1.0),
            };
            number
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(|value| value / scale)
                .ok_or_else(|| format!("invalid crop value '{token}'"))
        })
        .collect()
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if let Some(action) = find_action(&command, KEYWORD_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "value".to_string(),
                    Value::String(arg.to_ascii_lowercase()),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, PATH_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if command == CROP_COMMAND.command {
                let mut intent = Intent::new(CROP_COMMAND.action, text);
                match parse_crop_args(arg) {
                    Ok(values) if values.is_empty() || values.len() == 4 => {
                        intent.command_args.insert(
                            "rect".to_string(),
                            Value::Array(values.into_iter().map(Value::from).collect()),
                        );
                    }
                    Ok(values) => {
                        intent.command_args.insert(
                            "error".to_string(),
                            Value::String(format!(
                                "crop expects 4 values (x y width height), got {}",
                                values.len()
                            )),
                        );
                    }
                    Err(err) => {
                        intent
                            .command_args
                            .insert("error".to_string(), Value::String(err));
                    }
                }
                return intent;
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("edit", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn plain_text_is_an_edit_prompt() {
        let intent = parse_intent("  add a hat  ");
        assert_eq!(intent.action, "edit");
        assert_eq!(intent.prompt.as_deref(), Some("add a hat"));
    }

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn upload_path_supports_quotes() {
        let intent = parse_intent("/upload \"/tmp/my photos/cat.png\"");
        assert_eq!(intent.action, "upload");
        assert_eq!(intent.arg_str("path"), Some("/tmp/my photos/cat.png"));
    }

    #[test]
    fn download_without_dir_has_empty_path() {
        let intent = parse_intent("/download");
        assert_eq!(intent.action, "download");
        assert_eq!(intent.arg_str("path"), None);
    }

    #[test]
    fn keyword_commands_lowercase_their_argument() {
        let intent = parse_intent("/Filter Sepia");
        assert_eq!(intent.action, "set_filter");
        assert_eq!(intent.arg_str("value"), Some("sepia"));

        let blur = parse_intent("/blur");
        assert_eq!(blur.action, "blur");
        assert_eq!(blur.arg_str("value"), None);

        assert_eq!(parse_intent("/enhance on").action, "set_enhance");
        assert_eq!(parse_intent("/intensity high").action, "set_blur_intensity");
    }

    #[test]
    fn no_arg_commands() {
        for (raw, action) in [
            ("/undo", "undo"),
            ("/redo", "redo"),
            ("/reset", "reset"),
            ("/status", "status"),
            ("/wait", "wait"),
            ("/help", "help"),
        ] {
            assert_eq!(parse_intent(raw).action, action);
        }
    }

    #[test]
    fn crop_parses_fractions_and_percentages() {
        let intent = parse_intent("/crop 0.1, 0.2 50% 25%");
        assert_eq!(intent.action, "crop");
        assert_eq!(intent.command_args.get("rect"), Some(&json!([0.1, 0.2, 0.5, 0.25])));

        let default = parse_intent("/crop");
        assert_eq!(default.command_args.get("rect"), Some(&json!([])));
    }

    #[test]
    fn crop_reports_bad_arguments() {
        let wrong_count = parse_intent("/crop 0.1 0.2");
        assert_eq!(
            wrong_count.command_args.get("error"),
            Some(&json!("crop expects 4 values (x y width height), got 2"))
        );
        let garbage = parse_intent("/crop a b c d");
        assert_eq!(
            garbage.command_args.get("error"),
            Some(&json!("invalid crop value 'a'"))
        );
    }

    #[test]
    fn crop_rejects_non_finite_values() {
        for (raw, token) in [
            ("/crop nan 0 0.5 0.5", "nan"),
            ("/crop 0 inf 0.5 0.5", "inf"),
            ("/crop 0 0 -infinity% 0.5", "-infinity%"),
        ] {
            let intent = parse_intent(raw);
            assert_eq!(
                intent.command_args.get("error"),
                Some(&json!(format!("invalid crop value '{token}'"))),
                "{raw}"
            );
            assert!(intent.command_args.get("rect").is_none(), "{raw}");
        }
    }

    #[test]
    fn unknown_command_keeps_name_and_arg() {
        let intent = parse_intent("/sharpen lots");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args.get("command"), Some(&json!("sharpen")));
        assert_eq!(intent.command_args.get("arg"), Some(&json!("lots")));
    }

    #[test]
    fn slash_without_command_is_a_prompt() {
        let intent = parse_intent("/ make it moody");
        assert_eq!(intent.action, "edit");
        assert_eq!(intent.prompt.as_deref(), Some("/ make it moody"));
    }
}
