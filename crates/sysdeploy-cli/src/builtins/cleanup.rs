//! Housekeeping commands: `cleanup` and `refresh-md`.

use std::ffi::OsString;

use clap::Args;
use sysdeploy_daemon_types::{CleanupTarget, Operation};

use super::{begin, transaction_options};
use crate::cancel::CancellationToken;
use crate::client::CommandEnv;
use crate::client_run::await_transaction;
use crate::command::{Invocation, parse_command_args};
use crate::errors::CommandError;

#[derive(Debug, Args)]
struct CleanupArgs {
    /// Clear temporary files; will leave deployments unchanged
    #[arg(short = 'b', long)]
    base: bool,
    /// Remove pending deployment
    #[arg(short = 'p', long)]
    pending: bool,
    /// Remove rollback deployment
    #[arg(short = 'r', long)]
    rollback: bool,
    /// Delete cached rpm repo metadata
    #[arg(short = 'm', long)]
    repomd: bool,
}

impl CleanupArgs {
    fn targets(&self) -> Vec<CleanupTarget> {
        [
            (self.base, CleanupTarget::Base),
            (self.pending, CleanupTarget::Pending),
            (self.rollback, CleanupTarget::Rollback),
            (self.repomd, CleanupTarget::Metadata),
        ]
        .into_iter()
        .filter_map(|(selected, target)| selected.then_some(target))
        .collect()
    }
}

#[derive(Debug, Args)]
struct RefreshArgs {
    /// Expire current cache
    #[arg(short = 'f', long)]
    force: bool,
}

pub(super) fn run(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<CleanupArgs>(invocation, args)?;
    let targets = parsed.args.targets();
    if targets.is_empty() {
        return Err(CommandError::Invalid(String::from(
            "At least one cleanup option must be specified",
        )));
    }

    let options = transaction_options(invocation, parsed.packages);
    let mut session = env.session(&parsed.daemon)?;
    let address = begin(&mut session, Operation::Cleanup { targets }, options)?;
    await_transaction(&mut session, &address, &CancellationToken::default())?;
    Ok(())
}

pub(super) fn run_refresh_metadata(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<RefreshArgs>(invocation, args)?;
    let operation = Operation::RefreshMetadata {
        force: parsed.args.force,
    };
    let options = transaction_options(invocation, parsed.packages);
    let mut session = env.session(&parsed.daemon)?;
    let address = begin(&mut session, operation, options)?;
    await_transaction(&mut session, &address, &CancellationToken::default())?;
    Ok(())
}
