#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "token",
        action: "set_token",
        arg_key: "token",
    },
    CommandSpec {
        command: "imagine",
        action: "imagine",
        arg_key: "prompt",
    },
];

/// Image settings, each stored under its own name in `settings_update`.
pub(crate) const IMAGE_SETTING_COMMANDS: &[&str] =
    &["size", "count", "scheduler", "steps", "strength"];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "image",
        action: "attach_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "describe",
        action: "describe",
        arg_key: "path",
    },
    CommandSpec {
        command: "export",
        action: "export",
        arg_key: "path",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "new",
        action: "reset",
        arg_key: "",
    },
    CommandSpec {
        command: "images",
        action: "list_images",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/new",
    "/image",
    "/describe",
    "/export",
    "/imagine",
    "/images",
    "/size",
    "/count",
    "/scheduler",
    "/steps",
    "/strength",
    "/token",
];
