//! Following a transaction a command started and reporting what it did.

use sysdeploy_daemon_types::Deployment;

use crate::cancel::CancellationToken;
use crate::client::Session;
use crate::errors::CommandError;
use crate::exit::ExitStatus;
use crate::reconcile::{DeploymentSnapshot, reconcile};
use crate::transaction::{TransactionAddress, WaitContext, attach, run_to_completion};

pub(crate) const REBOOT_HINT: &str =
    "Changes queued for next boot. Run \"systemctl reboot\" to start a reboot";

/// Post-processing choices for [`transaction_client_run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ClientRunOptions {
    /// The daemon reboots on success, so nothing is left to report.
    pub(crate) reboot: bool,
    pub(crate) dry_run: bool,
    /// Report [`ExitStatus::Unchanged`] when no new deployment was created.
    pub(crate) exit_unchanged: bool,
}

/// Attaches to `address`, follows it to the end and reloads daemon state.
pub(crate) fn await_transaction(
    session: &mut Session<'_>,
    address: &TransactionAddress,
    cancel: &CancellationToken,
) -> Result<DeploymentSnapshot, CommandError> {
    let attached = attach(
        &session.client.slot,
        session.client.connector.as_ref(),
        address,
    )?;
    run_to_completion(
        attached,
        session.client.bus.as_mut(),
        WaitContext {
            console: &mut *session.console,
            interrupts: session.interrupts,
            cancel,
        },
    )?;
    Ok(reconcile(
        session.client.bus.as_mut(),
        session.reload_timeout,
    )?)
}

/// Runs a transaction to completion, then tells the user what changed.
///
/// `previous` is the default deployment before the transaction; a new one
/// afterwards means a reboot is needed to use it.
pub(crate) fn transaction_client_run(
    session: &mut Session<'_>,
    address: &TransactionAddress,
    cancel: &CancellationToken,
    previous: Option<&Deployment>,
    options: ClientRunOptions,
) -> Result<ExitStatus, CommandError> {
    let snapshot = await_transaction(session, address, cancel)?;

    if options.dry_run {
        session.console.line("Exiting because of '--dry-run' option")?;
        return Ok(ExitStatus::Success);
    }
    if options.reboot {
        return Ok(ExitStatus::Success);
    }
    if !snapshot.has_new_default(previous) {
        return Ok(if options.exit_unchanged {
            ExitStatus::Unchanged
        } else {
            ExitStatus::Success
        });
    }
    session.console.line(REBOOT_HINT)?;
    Ok(ExitStatus::Success)
}
