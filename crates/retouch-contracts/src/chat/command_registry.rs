#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "undo",
        action: "undo",
    },
    CommandSpec {
        command: "redo",
        action: "redo",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "wait",
        action: "wait",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

/// Commands whose argument is a single keyword such as an intensity or filter name.
pub(crate) const KEYWORD_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "blur",
        action: "blur",
    },
    CommandSpec {
        command: "intensity",
        action: "set_blur_intensity",
    },
    CommandSpec {
        command: "filter",
        action: "set_filter",
    },
    CommandSpec {
        command: "enhance",
        action: "set_enhance",
    },
];

pub(crate) const PATH_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

pub(crate) const CROP_COMMAND: CommandSpec = CommandSpec {
    command: "crop",
    action: "crop",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/upload <path>",
    "/blur [low|medium|high]",
    "/intensity <low|medium|high>",
    "/enhance [on|off]",
    "/filter <none|grayscale|sepia|invert>",
    "/crop [x y width height]",
    "/undo",
    "/redo",
    "/download [dir]",
    "/reset",
    "/status",
    "/wait",
    "/help",
];
