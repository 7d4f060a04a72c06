//! Commands that move the default deployment: `deploy`, `rebase` and
//! `rollback`.

use std::ffi::OsString;

use clap::Args;
use sysdeploy_daemon_types::Operation;

use super::{start_and_follow, transaction_options};
use crate::client::CommandEnv;
use crate::client_run::ClientRunOptions;
use crate::command::{Invocation, parse_command_args};
use crate::errors::CommandError;

#[derive(Debug, Args)]
struct DeployArgs {
    /// Revision (checksum or version) to deploy
    #[arg(value_name = "REVISION")]
    revision: String,
    /// Initiate a reboot after the deployment is prepared
    #[arg(short = 'r', long)]
    reboot: bool,
    /// If no new deployment made, exit 77
    #[arg(long = "unchanged-exit-77")]
    unchanged_exit_77: bool,
    /// Do not download latest data
    #[arg(short = 'C', long)]
    cache_only: bool,
}

#[derive(Debug, Args)]
struct RebaseArgs {
    /// Remote and branch to switch to, as REMOTE:BRANCH
    #[arg(value_name = "REFSPEC")]
    refspec: String,
    /// Revision on the new branch to deploy
    #[arg(value_name = "REVISION")]
    revision: Option<String>,
    /// Initiate a reboot after the operation is complete
    #[arg(short = 'r', long)]
    reboot: bool,
    /// If no new deployment made, exit 77
    #[arg(long = "unchanged-exit-77")]
    unchanged_exit_77: bool,
    /// Just download latest data, don't deploy
    #[arg(long, conflicts_with = "cache_only")]
    download_only: bool,
    /// Do not download latest data
    #[arg(short = 'C', long)]
    cache_only: bool,
}

#[derive(Debug, Args)]
struct RollbackArgs {
    /// Initiate a reboot after rollback is prepared
    #[arg(short = 'r', long)]
    reboot: bool,
}

pub(super) fn run_deploy(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<DeployArgs>(invocation, args)?;
    let deploy = parsed.args;
    let mut options = transaction_options(invocation, parsed.packages);
    options.reboot = deploy.reboot;
    options.cache_only = deploy.cache_only;
    let run = ClientRunOptions {
        reboot: deploy.reboot,
        dry_run: false,
        exit_unchanged: deploy.unchanged_exit_77,
    };
    let operation = Operation::Deploy {
        revision: deploy.revision,
    };
    start_and_follow(invocation, env, &parsed.daemon, operation, options, run)
}

pub(super) fn run_rebase(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<RebaseArgs>(invocation, args)?;
    let rebase = parsed.args;
    let mut options = transaction_options(invocation, parsed.packages);
    options.reboot = rebase.reboot;
    options.download_only = rebase.download_only;
    options.cache_only = rebase.cache_only;
    let run = ClientRunOptions {
        reboot: rebase.reboot,
        dry_run: false,
        exit_unchanged: rebase.unchanged_exit_77,
    };
    let operation = Operation::Rebase {
        refspec: rebase.refspec,
        revision: rebase.revision,
    };
    start_and_follow(invocation, env, &parsed.daemon, operation, options, run)
}

pub(super) fn run_rollback(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<RollbackArgs>(invocation, args)?;
    let reboot = parsed.args.reboot;
    let mut options = transaction_options(invocation, parsed.packages);
    options.reboot = reboot;
    let run = ClientRunOptions {
        reboot,
        ..ClientRunOptions::default()
    };
    start_and_follow(
        invocation,
        env,
        &parsed.daemon,
        Operation::Rollback,
        options,
        run,
    )
}
