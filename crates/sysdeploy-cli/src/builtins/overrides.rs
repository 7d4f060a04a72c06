//! `override`: replace, remove or reset packages of the base layer.

use std::ffi::OsString;

use clap::Args;
use sysdeploy_daemon_types::Operation;

use super::{start_and_follow, transaction_options};
use crate::client::CommandEnv;
use crate::client_run::ClientRunOptions;
use crate::command::{
    CommandDescriptor, CommandFlags, Invocation, ParsedArgs, dispatch_subcommand,
    parse_command_args,
};
use crate::errors::CommandError;

static SUBCOMMANDS: [CommandDescriptor; 3] = [
    CommandDescriptor {
        name: "replace",
        flags: CommandFlags::REQUIRES_ROOT,
        description: "Replace packages in the base layer",
        handler: run_replace,
    },
    CommandDescriptor {
        name: "remove",
        flags: CommandFlags::REQUIRES_ROOT,
        description: "Remove packages from the base layer",
        handler: run_remove,
    },
    CommandDescriptor {
        name: "reset",
        flags: CommandFlags::REQUIRES_ROOT,
        description: "Reset currently active package overrides",
        handler: run_reset,
    },
];

#[derive(Debug, Args)]
struct OverrideArgs {
    /// Packages to act on
    #[arg(value_name = "PACKAGE")]
    packages: Vec<String>,
    /// Initiate a reboot after the operation is complete
    #[arg(short = 'r', long)]
    reboot: bool,
    /// Exit after printing the transaction
    #[arg(short = 'n', long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ResetArgs {
    #[command(flatten)]
    common: OverrideArgs,
    /// Reset all active overrides
    #[arg(short = 'a', long, conflicts_with = "packages")]
    all: bool,
}

pub(super) fn run(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    dispatch_subcommand(invocation, args, &SUBCOMMANDS, env)
}

fn require_packages(args: &OverrideArgs) -> Result<(), CommandError> {
    if args.packages.is_empty() {
        return Err(CommandError::Invalid(String::from(
            "At least one PACKAGE must be specified",
        )));
    }
    Ok(())
}

fn follow(
    invocation: &mut Invocation,
    env: &mut CommandEnv<'_>,
    parsed: ParsedArgs<OverrideArgs>,
    operation: Operation,
) -> Result<(), CommandError> {
    let mut options = transaction_options(invocation, parsed.packages);
    options.reboot = parsed.args.reboot;
    options.dry_run = parsed.args.dry_run;
    let run = ClientRunOptions {
        reboot: parsed.args.reboot,
        dry_run: parsed.args.dry_run,
        exit_unchanged: false,
    };
    start_and_follow(invocation, env, &parsed.daemon, operation, options, run)
}

fn run_replace(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<OverrideArgs>(invocation, args)?;
    require_packages(&parsed.args)?;
    let operation = Operation::OverrideReplace {
        packages: parsed.args.packages.clone(),
    };
    follow(invocation, env, parsed, operation)
}

fn run_remove(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<OverrideArgs>(invocation, args)?;
    require_packages(&parsed.args)?;
    let operation = Operation::OverrideRemove {
        packages: parsed.args.packages.clone(),
    };
    follow(invocation, env, parsed, operation)
}

fn run_reset(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let ParsedArgs {
        args: reset,
        daemon,
        packages,
    } = parse_command_args::<ResetArgs>(invocation, args)?;
    if !reset.all {
        require_packages(&reset.common)?;
    }
    let operation = Operation::OverrideReset {
        packages: reset.common.packages.clone(),
        all: reset.all,
    };
    let parsed = ParsedArgs {
        args: reset.common,
        daemon,
        packages,
    };
    follow(invocation, env, parsed, operation)
}
