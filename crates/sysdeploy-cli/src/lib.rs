//! Command-line client for the sysdeploy deployment daemon.
//!
//! The client looks up the requested builtin, connects to the daemon on
//! demand, and follows any transaction the command starts until the daemon
//! reports it finished, it is cancelled, or the daemon goes away. The
//! runtime is usable from the binary entrypoint and from tests, where the
//! configuration loader, the daemon connection and the interrupt source
//! can be substituted.

use std::ffi::OsString;
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};

use anstyle::{AnsiColor, Effects, Style};

mod builtins;
mod bus;
mod cancel;
mod client;
mod client_run;
mod command;
mod config;
mod errors;
mod exit;
mod locator;
mod progress;
mod reconcile;
mod session;
mod telemetry;
mod transaction;
mod transport;

use builtins::COMMANDS;
use cancel::SignalInterrupts;
use client::{CommandEnv, Identity, Services, SystemClients};
use command::{Invocation, invoke, lookup, usage};
use config::{ConfigLoader, OrthoConfigLoader, split_global_arguments};
use errors::{AppError, CommandError};
pub use exit::{EXIT_SOFT, ExitStatus};
use progress::TerminalConsole;

const SYNOPSIS: &str = "sysdeploy [OPTION…] COMMAND";

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
    stdout_is_terminal: bool,
    stderr_is_terminal: bool,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self {
            stdout,
            stderr,
            stdout_is_terminal: io::stdout().is_terminal(),
            stderr_is_terminal: io::stderr().is_terminal(),
        }
    }

    #[cfg(test)]
    pub(crate) const fn detached(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self {
            stdout,
            stderr,
            stdout_is_terminal: false,
            stderr_is_terminal: false,
        }
    }
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader> {
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
    services: Services<'a>,
}

impl<'a, W, E, L> CliRunner<'a, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    const fn new(io: &'a mut IoStreams<'a, W, E>, loader: &'a L, services: Services<'a>) -> Self {
        Self {
            io,
            loader,
            services,
        }
    }

    fn run<I>(&mut self, args: I) -> ExitStatus
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        match self.dispatch(&args) {
            Ok(status) => status,
            Err(error) if error.is_cancelled() => {
                let _ = writeln!(self.io.stdout, "Cancelled.");
                ExitStatus::Success
            }
            Err(AppError::Command(CommandError::Usage(error))) => {
                // Help requests arrive as clap errors but are not failures.
                let rendered = error.render();
                if matches!(
                    error.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                ) {
                    let _ = write!(self.io.stdout, "{rendered}");
                    ExitStatus::Success
                } else {
                    let _ = write!(self.io.stderr, "{rendered}");
                    ExitStatus::Failure
                }
            }
            Err(error) => {
                let _ = write_error(self.io.stderr, &error, self.io.stderr_is_terminal);
                ExitStatus::Failure
            }
        }
    }

    fn dispatch(&mut self, args: &[OsString]) -> Result<ExitStatus, AppError> {
        let split = match split_global_arguments(args) {
            Ok(split) => split,
            Err(error) => {
                write!(self.io.stderr, "{}", top_level_usage())?;
                return Err(error);
            }
        };
        if split.version {
            writeln!(self.io.stdout, "sysdeploy {}", env!("CARGO_PKG_VERSION"))?;
            return Ok(ExitStatus::Success);
        }
        if split.help {
            write!(self.io.stdout, "{}", top_level_usage())?;
            return Ok(ExitStatus::Success);
        }
        let Some((name, command_args)) = split
            .command_start
            .and_then(|start| args.get(start..))
            .and_then(<[OsString]>::split_first)
        else {
            write!(self.io.stderr, "{}", top_level_usage())?;
            return Err(AppError::NoCommand);
        };
        let name = name.to_string_lossy();
        let Some(descriptor) = lookup(&COMMANDS, &name) else {
            write!(self.io.stderr, "{}", top_level_usage())?;
            return Err(AppError::UnknownCommand(name.into_owned()));
        };

        let config = self.loader.load(&split.config_arguments)?;
        if let Err(error) = telemetry::initialise(&config) {
            writeln!(self.io.stderr, "warning: {error}")?;
        }

        let mut invocation = Invocation::new(descriptor, args);
        let interactive = self.io.stdout_is_terminal;
        let mut console = TerminalConsole::new(&mut *self.io.stdout, &mut *self.io.stderr, interactive);
        let mut env = CommandEnv::new(&config, &mut console, self.services);
        invoke(&mut invocation, command_args, &mut env)?;
        Ok(invocation.exit.unwrap_or_default())
    }
}

fn top_level_usage() -> String {
    usage(&COMMANDS, SYNOPSIS, "Builtin Commands")
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Red.into()))
        .effects(Effects::BOLD)
}

/// Writes `error: <message>`, with the prefix styled on a terminal.
fn write_error<E: Write>(stderr: &mut E, error: &dyn Display, styled: bool) -> io::Result<()> {
    if styled {
        let style = error_style();
        writeln!(
            stderr,
            "{}error:{} {error}",
            style.render(),
            style.render_reset()
        )
    } else {
        writeln!(stderr, "error: {error}")
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitStatus
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    let services = Services {
        clients: &SystemClients,
        interrupts: &SignalInterrupts,
        identity: Identity::current(),
    };
    CliRunner::new(&mut io, &OrthoConfigLoader, services).run(args)
}

/// Runs the CLI with substituted configuration and daemon services.
#[cfg(test)]
pub(crate) fn run_with_services<'a, I, W, E, L>(
    args: I,
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
    services: Services<'a>,
) -> ExitStatus
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    CliRunner::new(io, loader, services).run(args)
}
