use std::ffi::OsString;

use clap::Args;
use sysdeploy_daemon_types::{Operation, TransactionOptions};

use super::{begin, start_and_follow, transaction_options};
use crate::cancel::CancellationToken;
use crate::client::CommandEnv;
use crate::client_run::{ClientRunOptions, await_transaction};
use crate::command::{DaemonOptions, Invocation, parse_command_args};
use crate::errors::CommandError;
use crate::exit::ExitStatus;

#[derive(Debug, Args)]
struct UpgradeArgs {
    /// Initiate a reboot after an upgrade is prepared
    #[arg(short = 'r', long)]
    reboot: bool,
    /// Just check if an upgrade is available
    #[arg(long, conflicts_with = "reboot")]
    check: bool,
    /// Just preview package differences
    #[arg(long, conflicts_with = "reboot")]
    preview: bool,
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

pub(super) fn run(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<UpgradeArgs>(invocation, args)?;
    let upgrade = parsed.args;
    let check_only = upgrade.check || upgrade.preview;

    let mut options = transaction_options(invocation, parsed.packages);
    options.reboot = upgrade.reboot;
    options.download_only = upgrade.download_only;
    options.cache_only = upgrade.cache_only;

    if check_only {
        return check_for_update(invocation, env, &parsed.daemon, options);
    }
    let run = ClientRunOptions {
        reboot: upgrade.reboot,
        dry_run: false,
        exit_unchanged: upgrade.unchanged_exit_77,
    };
    start_and_follow(
        invocation,
        env,
        &parsed.daemon,
        Operation::Upgrade { check_only },
        options,
        run,
    )
}

/// Runs a check-only upgrade and reports the update it found, if any.
fn check_for_update(
    invocation: &mut Invocation,
    env: &mut CommandEnv<'_>,
    daemon: &DaemonOptions,
    options: TransactionOptions,
) -> Result<(), CommandError> {
    let mut session = env.session(daemon)?;
    let cancel = CancellationToken::default();
    let address = begin(&mut session, Operation::Upgrade { check_only: true }, options)?;
    let snapshot = await_transaction(&mut session, &address, &cancel)?;
    match snapshot.cached_update {
        Some(update) => {
            let version = update.version.as_deref().unwrap_or("-");
            session.console.line(&format!(
                "AvailableUpdate:\n  Version: {version}\n  Commit: {}\n  Origin: {}",
                update.checksum, update.origin
            ))?;
        }
        None => {
            session.console.line("No updates available.")?;
            invocation.exit = Some(ExitStatus::Unchanged);
        }
    }
    Ok(())
}
