//! `cancel`: ask the daemon to stop its active transaction and wait until
//! it is gone.

use std::ffi::OsString;
use std::sync::mpsc;

use clap::Args;
use sysdeploy_daemon_types::WatchTopic;
use tracing::{debug, warn};

use crate::bus::BusNotification;
use crate::client::CommandEnv;
use crate::command::{Invocation, parse_command_args};
use crate::errors::CommandError;
use crate::locator::{LocatorPolicy, find_active};
use crate::transaction::TransactionAddress;

const CANCEL_TARGET: &str = "sysdeploy::cancel";

#[derive(Debug, Args)]
struct CancelArgs {}

pub(super) fn run(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<CancelArgs>(invocation, args)?;
    let session = env.session(&parsed.daemon)?;
    let client = session.client;
    let console = session.console;

    let Some(mut active) = find_active(
        client.bus.as_mut(),
        client.connector.as_ref(),
        LocatorPolicy::default(),
    )?
    else {
        // Cancellation can race with completion; that is not an error.
        console.line("No active transaction.")?;
        return Ok(());
    };

    let title = active.channel.title()?;
    console.line(&format!("Cancelling transaction: {title}"))?;

    let (sender, changes) = mpsc::channel();
    let _watch = client.bus.watch(
        WatchTopic::ActiveTransaction,
        Box::new(move |notification| {
            if sender.send(notification).is_err() {
                debug!(target: CANCEL_TARGET, "change arrived after the wait ended");
            }
        }),
    )?;

    if let Err(error) = active.channel.cancel() {
        warn!(target: CANCEL_TARGET, %error, "failed to send cancel request");
    }
    drop(active.channel);

    let cancelled = active.address;
    if still_active(client.bus.active_transaction()?.as_ref(), &cancelled) {
        wait_for_change(&changes, &cancelled);
    }
    console.line("Cancelled.")?;
    Ok(())
}

fn still_active(current: Option<&TransactionAddress>, cancelled: &TransactionAddress) -> bool {
    current == Some(cancelled)
}

/// Blocks until the daemon stops advertising `cancelled`.
fn wait_for_change(changes: &mpsc::Receiver<BusNotification>, cancelled: &TransactionAddress) {
    for notification in changes {
        match notification {
            BusNotification::ActiveTransactionChanged(current) => {
                if !still_active(current.as_ref(), cancelled) {
                    return;
                }
            }
            BusNotification::Closed => {
                debug!(target: CANCEL_TARGET, "daemon went away while cancelling");
                return;
            }
            BusNotification::OwnerChanged(_) => {}
        }
    }
}
