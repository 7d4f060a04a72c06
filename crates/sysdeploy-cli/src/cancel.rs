//! Interrupt-driven cancellation of an attached transaction.
//!
//! The first interrupt asks the daemon to cancel; later ones only tell the
//! user the request is still pending. Cancellation is cooperative, so the
//! wait continues until the daemon reports that the transaction finished.
//! Outside a wait, SIGINT and SIGTERM keep their default action.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use once_cell::sync::OnceCell;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag::register_conditional_default;
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

use crate::transaction::{LoopEvent, TransactionChannel, TransactionError};

const CANCEL_TARGET: &str = "sysdeploy::cancel";

const INTERRUPTS: [i32; 2] = [SIGINT, SIGTERM];

/// Set while no wait is intercepting interrupts.
static DEFAULT_ACTION: OnceCell<Arc<AtomicBool>> = OnceCell::new();

/// Returns the flag that lets interrupts terminate the process, registering
/// the conditional default action on first use.
fn default_action() -> io::Result<&'static Arc<AtomicBool>> {
    DEFAULT_ACTION.get_or_try_init(|| {
        let flag = Arc::new(AtomicBool::new(true));
        for signal in INTERRUPTS {
            register_conditional_default(signal, Arc::clone(&flag))?;
        }
        Ok(flag)
    })
}

/// Shared flag recording that the user asked for cancellation.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Marks the token cancelled. Returns `true` for the first caller only.
    pub(crate) fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterruptNotice {
    Cancelling,
    StillWaiting,
}

impl InterruptNotice {
    pub(crate) const fn message(self) -> &'static str {
        match self {
            Self::Cancelling => "Caught SIGINT, cancelling transaction",
            Self::StillWaiting => "Awaiting transaction cancellation...",
        }
    }
}

/// Reacts to one interrupt. Only the first sends a remote cancel.
pub(crate) fn handle_interrupt(
    token: &CancellationToken,
    channel: &mut dyn TransactionChannel,
) -> InterruptNotice {
    if !token.cancel() {
        return InterruptNotice::StillWaiting;
    }
    if let Err(error) = channel.cancel() {
        warn!(target: CANCEL_TARGET, %error, "failed to send cancel request");
    }
    InterruptNotice::Cancelling
}

/// Source of interrupt events for the wait loop.
pub(crate) trait InterruptSource {
    /// Starts forwarding interrupts to `sink` until the guard is dropped.
    fn install(&self, sink: Sender<LoopEvent>) -> Result<InterruptGuard, TransactionError>;
}

/// Keeps an interrupt handler registered. Dropping it hands interrupts
/// back to their default action.
#[derive(Default)]
pub(crate) struct InterruptGuard {
    handle: Option<Handle>,
    thread: Option<JoinHandle<()>>,
    default_action: Option<&'static Arc<AtomicBool>>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: CANCEL_TARGET, "signal thread panicked");
        }
        if let Some(flag) = self.default_action.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Turns SIGINT and SIGTERM into [`LoopEvent::Interrupt`].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SignalInterrupts;

impl InterruptSource for SignalInterrupts {
    fn install(&self, sink: Sender<LoopEvent>) -> Result<InterruptGuard, TransactionError> {
        let restore = default_action().map_err(TransactionError::Interrupts)?;
        let mut signals = Signals::new(INTERRUPTS).map_err(TransactionError::Interrupts)?;
        restore.store(false, Ordering::SeqCst);
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name(String::from("sysdeploy-signals"))
            .spawn(move || {
                for signal in signals.forever() {
                    debug!(target: CANCEL_TARGET, signal, "interrupt received");
                    if sink.send(LoopEvent::Interrupt).is_err() {
                        break;
                    }
                }
            })
            .map_err(|error| {
                handle.close();
                restore.store(true, Ordering::SeqCst);
                TransactionError::Spawn(error)
            })?;
        Ok(InterruptGuard {
            handle: Some(handle),
            thread: Some(thread),
            default_action: Some(restore),
        })
    }
}
