use std::sync::mpsc::{self, Receiver, Sender};

use sysdeploy_daemon_types::WatchTopic;
use tracing::{debug, info, warn};

use super::{Attached, TRANSACTION_TARGET, TransactionChannel, TransactionError, TransactionSignal};
use crate::bus::{BusNotification, DaemonBus, WatchHandle};
use crate::cancel::{CancellationToken, InterruptSource, handle_interrupt};
use crate::progress::{Console, ProgressEvent, ProgressState};

/// Everything the wait loop can be woken by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoopEvent {
    Progress(ProgressEvent),
    TransactionClosed,
    Interrupt,
    OwnerChanged,
}

/// Collaborators of one wait, passed explicitly rather than held globally.
pub(crate) struct WaitContext<'a> {
    pub(crate) console: &'a mut dyn Console,
    pub(crate) interrupts: &'a dyn InterruptSource,
    pub(crate) cancel: &'a CancellationToken,
}

/// Starts an attached transaction and follows it until it finishes, is
/// cancelled, or its daemon goes away.
///
/// Interrupt handling and the owner-change watch are only live for the
/// duration of this call.
pub(crate) fn run_to_completion(
    mut attached: Attached,
    bus: &mut dyn DaemonBus,
    context: WaitContext<'_>,
) -> Result<(), TransactionError> {
    let (sender, events) = mpsc::channel();
    let owner_watch = watch_owner(bus, &sender)?;
    let interrupt_guard = context.interrupts.install(sender.clone())?;

    let signal_sender = sender.clone();
    attached
        .channel
        .subscribe(Box::new(move |signal| {
            let event = match signal {
                TransactionSignal::Progress(event) => LoopEvent::Progress(event),
                TransactionSignal::Closed => LoopEvent::TransactionClosed,
            };
            if signal_sender.send(event).is_err() {
                debug!(target: TRANSACTION_TARGET, "event arrived after the wait ended");
            }
        }))?;
    drop(sender);

    let outcome = attached.channel.start().and_then(|just_started| {
        if just_started {
            debug!(target: TRANSACTION_TARGET, address = %attached.address, "transaction started");
        } else {
            info!(target: TRANSACTION_TARGET, address = %attached.address, "reattached to transaction in progress");
        }
        drive(attached.channel.as_mut(), &events, context)
    });

    attached.channel.unsubscribe();
    drop(interrupt_guard);
    drop(owner_watch);
    outcome
}

fn watch_owner(
    bus: &mut dyn DaemonBus,
    sender: &Sender<LoopEvent>,
) -> Result<Option<WatchHandle>, TransactionError> {
    if !bus.is_addressed() {
        return Ok(None);
    }
    let owner_sender = sender.clone();
    let handle = bus.watch(
        WatchTopic::NameOwner,
        Box::new(move |notification| {
            match notification {
                BusNotification::OwnerChanged(owner) => {
                    warn!(target: TRANSACTION_TARGET, ?owner, "daemon name changed owner");
                }
                // The watch only closes when the daemon itself went away.
                BusNotification::Closed => {
                    warn!(target: TRANSACTION_TARGET, "daemon dropped the owner watch");
                }
                BusNotification::ActiveTransactionChanged(_) => return,
            }
            if owner_sender.send(LoopEvent::OwnerChanged).is_err() {
                debug!(target: TRANSACTION_TARGET, "owner change arrived after the wait ended");
            }
        }),
    )?;
    Ok(Some(handle))
}

fn drive(
    channel: &mut dyn TransactionChannel,
    events: &Receiver<LoopEvent>,
    context: WaitContext<'_>,
) -> Result<(), TransactionError> {
    let WaitContext {
        console, cancel, ..
    } = context;
    let mut progress = ProgressState::default();

    while !progress.is_complete() {
        let Ok(event) = events.recv() else {
            return Err(interrupted_outcome(cancel));
        };
        match event {
            LoopEvent::Progress(event) => {
                let step = progress.apply(&event);
                if step.replaced_open_task {
                    warn!(target: TRANSACTION_TARGET, ?event, "task began while another was open");
                }
                progress = step.state;
                for action in &step.actions {
                    console.render(action).map_err(TransactionError::Output)?;
                }
            }
            LoopEvent::Interrupt => {
                let notice = handle_interrupt(cancel, channel);
                console
                    .notice(notice.message())
                    .map_err(TransactionError::Output)?;
            }
            LoopEvent::OwnerChanged => {
                let (_, action) = progress.abandon();
                if let Some(action) = action {
                    console.render(&action).map_err(TransactionError::Output)?;
                }
                return Err(TransactionError::OwnerChanged);
            }
            LoopEvent::TransactionClosed => {
                let (_, action) = progress.abandon();
                if let Some(action) = action {
                    console.render(&action).map_err(TransactionError::Output)?;
                }
                return Err(interrupted_outcome(cancel));
            }
        }
    }

    if cancel.is_cancelled() {
        // The daemon's own report of the cancelled run is not an error here.
        if let Some(message) = progress.error() {
            debug!(target: TRANSACTION_TARGET, message, "ignoring failure after cancellation");
        }
        return Err(TransactionError::Cancelled);
    }
    match progress.error() {
        Some(message) => Err(TransactionError::failed(message)),
        None => Ok(()),
    }
}

fn interrupted_outcome(cancel: &CancellationToken) -> TransactionError {
    if cancel.is_cancelled() {
        TransactionError::Cancelled
    } else {
        TransactionError::Disconnected
    }
}
