//! The command table and per-command argument handling.
//!
//! Each builtin is a [`CommandDescriptor`]: a name, a set of
//! [`CommandFlags`] and a handler. Handlers parse their own arguments with
//! [`parse_command_args`], which adds the shared daemon and package options
//! according to the descriptor's flags.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt::Write as _;

use camino::Utf8PathBuf;
use clap::{Args, FromArgMatches};

use crate::client::CommandEnv;
use crate::errors::CommandError;
use crate::exit::ExitStatus;

/// Behaviour switches attached to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct CommandFlags(u8);

impl CommandFlags {
    pub(crate) const NONE: Self = Self(0);
    /// Runs without talking to the daemon.
    pub(crate) const LOCAL: Self = Self(1);
    pub(crate) const REQUIRES_ROOT: Self = Self(1 << 1);
    /// Omitted from usage listings.
    pub(crate) const HIDDEN: Self = Self(1 << 2);
    /// Accepts `--install` and `--uninstall`.
    pub(crate) const SUPPORTS_PACKAGE_INSTALLS: Self = Self(1 << 3);

    pub(crate) const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub(crate) const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

pub(crate) type Handler =
    fn(&mut Invocation, &[OsString], &mut CommandEnv<'_>) -> Result<(), CommandError>;

pub(crate) struct CommandDescriptor {
    pub(crate) name: &'static str,
    pub(crate) flags: CommandFlags,
    pub(crate) description: &'static str,
    pub(crate) handler: Handler,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// One run of a command.
#[derive(Debug)]
pub(crate) struct Invocation {
    pub(crate) command: &'static CommandDescriptor,
    /// Shell-quoted reconstruction of the full command line, passed to the
    /// daemon for its logs.
    pub(crate) command_line: String,
    /// Set by handlers that finish with something other than success.
    pub(crate) exit: Option<ExitStatus>,
}

impl Invocation {
    pub(crate) fn new(command: &'static CommandDescriptor, args: &[OsString]) -> Self {
        Self {
            command,
            command_line: quote_command_line(args),
            exit: None,
        }
    }

    fn nested(&self, command: &'static CommandDescriptor) -> Self {
        Self {
            command,
            command_line: self.command_line.clone(),
            exit: None,
        }
    }
}

pub(crate) fn lookup(
    table: &'static [CommandDescriptor],
    name: &str,
) -> Option<&'static CommandDescriptor> {
    table.iter().find(|descriptor| descriptor.name == name)
}

/// Lists the visible commands of `table` under `heading`.
pub(crate) fn usage(table: &[CommandDescriptor], synopsis: &str, heading: &str) -> String {
    let mut text = format!("Usage:\n  {synopsis}\n\n{heading}:\n");
    for descriptor in table
        .iter()
        .filter(|descriptor| !descriptor.flags.contains(CommandFlags::HIDDEN))
    {
        let _ = writeln!(text, "  {:<20} {}", descriptor.name, descriptor.description);
    }
    text
}

fn quote_argument(argument: &str) -> Cow<'_, str> {
    let plain = !argument.is_empty()
        && argument
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        Cow::Borrowed(argument)
    } else {
        Cow::Owned(format!("'{}'", argument.replace('\'', r"'\''")))
    }
}

pub(crate) fn quote_command_line(args: &[OsString]) -> String {
    args.iter()
        .map(|argument| quote_argument(&argument.to_string_lossy()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Options shared by every command that talks to the daemon.
#[derive(Debug, Clone, Args)]
pub(crate) struct DaemonOptions {
    /// Force a peer-to-peer connection instead of using the system bus
    #[arg(long)]
    pub(crate) peer: bool,
    /// Use system root SYSROOT
    #[arg(long, value_name = "SYSROOT", default_value = "/")]
    pub(crate) sysroot: Utf8PathBuf,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            peer: false,
            sysroot: Utf8PathBuf::from("/"),
        }
    }
}

/// Package layering requested alongside another operation.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct PackageOptions {
    /// Overlay additional package
    #[arg(long = "install", value_name = "PKG")]
    pub(crate) install: Vec<String>,
    /// Remove overlayed additional package
    #[arg(long = "uninstall", value_name = "PKG")]
    pub(crate) uninstall: Vec<String>,
}

/// A command's own arguments plus the shared options its flags enable.
#[derive(Debug)]
pub(crate) struct ParsedArgs<T> {
    pub(crate) args: T,
    pub(crate) daemon: DaemonOptions,
    pub(crate) packages: PackageOptions,
}

/// Parses `args` (everything after the command name) into `T`.
pub(crate) fn parse_command_args<T>(
    invocation: &Invocation,
    args: &[OsString],
) -> Result<ParsedArgs<T>, CommandError>
where
    T: Args + FromArgMatches,
{
    let descriptor = invocation.command;
    let daemon_options = !descriptor.flags.contains(CommandFlags::LOCAL);
    let package_options = descriptor
        .flags
        .contains(CommandFlags::SUPPORTS_PACKAGE_INSTALLS);

    let mut command = clap::Command::new(descriptor.name)
        .bin_name(format!("sysdeploy {}", descriptor.name))
        .about(descriptor.description)
        .no_binary_name(true)
        .disable_version_flag(true);
    command = T::augment_args(command);
    if daemon_options {
        command = DaemonOptions::augment_args(command);
    }
    if package_options {
        command = PackageOptions::augment_args(command);
    }

    let matches = command
        .try_get_matches_from(args)
        .map_err(CommandError::Usage)?;
    let parsed = T::from_arg_matches(&matches).map_err(CommandError::Usage)?;
    let daemon = if daemon_options {
        DaemonOptions::from_arg_matches(&matches).map_err(CommandError::Usage)?
    } else {
        DaemonOptions::default()
    };
    let packages = if package_options {
        PackageOptions::from_arg_matches(&matches).map_err(CommandError::Usage)?
    } else {
        PackageOptions::default()
    };
    Ok(ParsedArgs {
        args: parsed,
        daemon,
        packages,
    })
}

/// Runs `invocation`'s handler after the privilege check.
pub(crate) fn invoke(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    if invocation.command.flags.contains(CommandFlags::REQUIRES_ROOT) && !env.is_privileged() {
        return Err(CommandError::RequiresRoot);
    }
    tracing::debug!(
        target: "sysdeploy::command",
        command = invocation.command.name,
        command_line = %invocation.command_line,
        "dispatching command"
    );
    (invocation.command.handler)(invocation, args, env)
}

/// Dispatches the first of `args` as a subcommand from `table`.
///
/// The subcommand's exit status becomes the parent's.
pub(crate) fn dispatch_subcommand(
    invocation: &mut Invocation,
    args: &[OsString],
    table: &'static [CommandDescriptor],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parent = invocation.command.name;
    let synopsis = format!("sysdeploy {parent} [OPTION…] COMMAND");
    let heading = format!("Builtin \"{parent}\" Commands");
    let Some((name, rest)) = args.split_first() else {
        env.console.notice(&usage(table, &synopsis, &heading))?;
        return Err(CommandError::NoSubcommand);
    };
    let name = name.to_string_lossy();
    if name == "-h" || name == "--help" {
        env.console.line(&usage(table, &synopsis, &heading))?;
        return Ok(());
    }
    let Some(descriptor) = lookup(table, &name) else {
        env.console.notice(&usage(table, &synopsis, &heading))?;
        return Err(CommandError::UnknownSubcommand {
            parent,
            name: name.into_owned(),
        });
    };

    let mut nested = invocation.nested(descriptor);
    invoke(&mut nested, rest, env)?;
    invocation.exit = nested.exit;
    Ok(())
}
