//! Separating global options from the command on the command line.
//!
//! Everything before the command name is a global option: either a
//! configuration flag handed to `ortho-config`, or `--help`/`--version`.
//! Anything else in that position is rejected.

use std::ffi::{OsStr, OsString};

use sysdeploy_config::Config;

use crate::errors::AppError;

/// CLI flags recognised by the configuration loader.
///
/// Keep in sync with the fields of [`sysdeploy_config::Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--bus-socket",
    "--peer-socket",
    "--client-id",
    "--log-filter",
    "--log-format",
    "--registration-attempts",
    "--registration-backoff-ms",
    "--reload-timeout-secs",
    "--session-dir",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name plus configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_args(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobalArgument {
    Config { needs_value: bool },
    Help,
    Version,
    EndOfOptions,
    Unknown,
    Command,
}

fn classify(argument: &OsStr) -> GlobalArgument {
    let text = argument.to_string_lossy();
    match text.as_ref() {
        "-h" | "--help" => return GlobalArgument::Help,
        "--version" => return GlobalArgument::Version,
        "--" => return GlobalArgument::EndOfOptions,
        _ => {}
    }
    if !text.starts_with('-') || text == "-" {
        return GlobalArgument::Command;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        GlobalArgument::Config {
            needs_value: !inline_value,
        }
    } else {
        GlobalArgument::Unknown
    }
}

/// Result of splitting the command line at the command name.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct GlobalArguments {
    /// Program name followed by configuration flags and their values.
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) help: bool,
    pub(crate) version: bool,
    /// Index of the command name, when one was given.
    pub(crate) command_start: Option<usize>,
}

pub(crate) fn split_global_arguments(args: &[OsString]) -> Result<GlobalArguments, AppError> {
    let mut split = GlobalArguments::default();
    let Some(program) = args.first() else {
        return Ok(split);
    };
    split.config_arguments.push(program.clone());

    let mut index = 1;
    while index < args.len() {
        let argument = &args[index];
        match classify(argument) {
            GlobalArgument::Config { needs_value } => {
                split.config_arguments.push(argument.clone());
                if needs_value && let Some(value) = args.get(index + 1) {
                    split.config_arguments.push(value.clone());
                    index += 1;
                }
            }
            GlobalArgument::Help => split.help = true,
            GlobalArgument::Version => split.version = true,
            GlobalArgument::EndOfOptions => {
                if index + 1 < args.len() {
                    split.command_start = Some(index + 1);
                }
                break;
            }
            GlobalArgument::Unknown => {
                return Err(AppError::UnknownOption(argument.to_string_lossy().into_owned()));
            }
            GlobalArgument::Command => {
                split.command_start = Some(index);
                break;
            }
        }
        index += 1;
    }
    Ok(split)
}
