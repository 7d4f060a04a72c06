//! The `sysdeploy` command table.

mod cancel;
mod cleanup;
mod deploy;
mod overrides;
mod reload;
mod status;
mod upgrade;

use sysdeploy_daemon_types::{Deployment, Operation, TransactionOptions};

use crate::cancel::CancellationToken;
use crate::client::{CommandEnv, Session};
use crate::client_run::{ClientRunOptions, transaction_client_run};
use crate::command::{CommandDescriptor, CommandFlags, DaemonOptions, Invocation, PackageOptions};
use crate::errors::CommandError;
use crate::transaction::TransactionAddress;

const ROOT: CommandFlags = CommandFlags::REQUIRES_ROOT;
const ROOT_WITH_PACKAGES: CommandFlags = ROOT.union(CommandFlags::SUPPORTS_PACKAGE_INSTALLS);

pub(crate) static COMMANDS: [CommandDescriptor; 11] = [
    CommandDescriptor {
        name: "cancel",
        flags: CommandFlags::NONE,
        description: "Cancel an active transaction",
        handler: cancel::run,
    },
    CommandDescriptor {
        name: "cleanup",
        flags: ROOT,
        description: "Clear cached/pending data",
        handler: cleanup::run,
    },
    CommandDescriptor {
        name: "deploy",
        flags: ROOT_WITH_PACKAGES,
        description: "Deploy a specific commit",
        handler: deploy::run_deploy,
    },
    CommandDescriptor {
        name: "override",
        flags: CommandFlags::LOCAL,
        description: "Manage base package overrides",
        handler: overrides::run,
    },
    CommandDescriptor {
        name: "rebase",
        flags: ROOT_WITH_PACKAGES,
        description: "Switch to a different tree",
        handler: deploy::run_rebase,
    },
    CommandDescriptor {
        name: "refresh-md",
        flags: ROOT,
        description: "Generate package repo metadata",
        handler: cleanup::run_refresh_metadata,
    },
    CommandDescriptor {
        name: "reload",
        flags: ROOT,
        description: "Reload configuration",
        handler: reload::run,
    },
    CommandDescriptor {
        name: "rollback",
        flags: ROOT,
        description: "Revert to the previously booted tree",
        handler: deploy::run_rollback,
    },
    CommandDescriptor {
        name: "status",
        flags: CommandFlags::NONE,
        description: "Get the version of the booted system",
        handler: status::run,
    },
    CommandDescriptor {
        name: "update",
        flags: ROOT_WITH_PACKAGES.union(CommandFlags::HIDDEN),
        description: "Alias for upgrade",
        handler: upgrade::run,
    },
    CommandDescriptor {
        name: "upgrade",
        flags: ROOT_WITH_PACKAGES,
        description: "Perform a system upgrade",
        handler: upgrade::run,
    },
];

/// Options sent with every transaction `invocation` begins.
fn transaction_options(invocation: &Invocation, packages: PackageOptions) -> TransactionOptions {
    TransactionOptions {
        install: packages.install,
        uninstall: packages.uninstall,
        initiating_command_line: invocation.command_line.clone(),
        ..TransactionOptions::default()
    }
}

/// The deployment that boots next, read before a transaction changes it.
fn current_default(session: &mut Session<'_>) -> Result<Option<Deployment>, CommandError> {
    Ok(session.client.bus.deployments()?.into_iter().next())
}

fn begin(
    session: &mut Session<'_>,
    operation: Operation,
    options: TransactionOptions,
) -> Result<TransactionAddress, CommandError> {
    Ok(session.client.bus.begin(operation, options)?)
}

/// Begins `operation` and follows it through the shared client helper,
/// recording the resulting exit status on `invocation`.
fn start_and_follow(
    invocation: &mut Invocation,
    env: &mut CommandEnv<'_>,
    daemon: &DaemonOptions,
    operation: Operation,
    options: TransactionOptions,
    run: ClientRunOptions,
) -> Result<(), CommandError> {
    let mut session = env.session(daemon)?;
    let cancel = CancellationToken::default();
    let previous = current_default(&mut session)?;
    let address = begin(&mut session, operation, options)?;
    let status = transaction_client_run(&mut session, &address, &cancel, previous.as_ref(), run)?;
    invocation.exit = Some(status);
    Ok(())
}
