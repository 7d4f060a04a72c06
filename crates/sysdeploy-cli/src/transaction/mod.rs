//! Attaching to a daemon transaction and following it to completion.
//!
//! A transaction is reached over its own connection. Events must be
//! subscribed before `start` is sent, since the daemon begins emitting as
//! soon as it sees `start`. At most one transaction is attached per process;
//! [`AttachmentSlot`] enforces that.

mod runner;
mod socket;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sysdeploy_config::SocketParseError;
use thiserror::Error;

pub(crate) use runner::{LoopEvent, WaitContext, run_to_completion};
pub(crate) use socket::SocketConnector;

use crate::bus::BusError;
use crate::progress::ProgressEvent;
use crate::transport::TransportError;

pub(crate) const TRANSACTION_TARGET: &str = "sysdeploy::transaction";

/// Address of one in-flight transaction, as handed out by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TransactionAddress(String);

impl TransactionAddress {
    /// Wraps a daemon-reported path; the empty path means "none".
    pub(crate) fn from_path(path: impl Into<String>) -> Option<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            None
        } else {
            Some(Self(path))
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub(crate) enum TransactionError {
    #[error("invalid transaction address {address}: {source}")]
    InvalidAddress {
        address: String,
        source: SocketParseError,
    },
    #[error("failed to connect to transaction {address}: {source}")]
    Attach {
        address: String,
        source: TransportError,
    },
    #[error("already attached to transaction {address}")]
    AlreadyAttached { address: String },
    #[error("transaction events must be subscribed before start")]
    NotSubscribed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transaction connection closed during {0}")]
    Closed(&'static str),
    #[error("unexpected transaction reply to {method}: {reply}")]
    UnexpectedReply { method: &'static str, reply: String },
    #[error("{0}")]
    Failed(String),
    #[error(
        "Bus owner changed, aborting. This likely means the daemon crashed; check logs with `journalctl -xe`."
    )]
    OwnerChanged,
    #[error("lost connection to the transaction before it finished")]
    Disconnected,
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("failed to install interrupt handler: {0}")]
    Interrupts(io::Error),
    #[error("failed to start transaction reader: {0}")]
    Spawn(io::Error),
    #[error("failed to write progress: {0}")]
    Output(io::Error),
}

impl TransactionError {
    /// Builds the error for a transaction that finished unsuccessfully.
    pub(crate) fn failed(message: &str) -> Self {
        if message.trim().is_empty() {
            Self::Failed(String::from("transaction failed"))
        } else {
            Self::Failed(message.to_owned())
        }
    }
}

/// What the transaction's reader thread delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransactionSignal {
    Progress(ProgressEvent),
    /// The transaction connection closed.
    Closed,
}

pub(crate) type EventSink = Box<dyn Fn(TransactionSignal) + Send>;

/// A private connection to one transaction.
pub(crate) trait TransactionChannel {
    fn title(&mut self) -> Result<String, TransactionError>;

    /// Routes every subsequent event into `sink`.
    fn subscribe(&mut self, sink: EventSink) -> Result<(), TransactionError>;

    /// Sends the start handshake. Returns `false` when the daemon had
    /// already started the transaction for another client.
    fn start(&mut self) -> Result<bool, TransactionError>;

    /// Sends a cancellation request without waiting for a reply.
    fn cancel(&mut self) -> Result<(), TransactionError>;

    /// Stops delivering events. Safe to call more than once.
    fn unsubscribe(&mut self);
}

pub(crate) trait TransactionConnector {
    fn connect(
        &self,
        address: &TransactionAddress,
    ) -> Result<Box<dyn TransactionChannel>, TransactionError>;
}

/// Process-wide record of whether a transaction is attached.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttachmentSlot {
    held: Arc<AtomicBool>,
}

impl AttachmentSlot {
    fn claim(&self, address: &TransactionAddress) -> Result<SlotGuard, TransactionError> {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TransactionError::AlreadyAttached {
                address: address.to_string(),
            })?;
        Ok(SlotGuard {
            held: Arc::clone(&self.held),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct SlotGuard {
    held: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

/// A transaction this process is attached to. Dropping it detaches.
pub(crate) struct Attached {
    address: TransactionAddress,
    channel: Box<dyn TransactionChannel>,
    _slot: SlotGuard,
}

impl Drop for Attached {
    fn drop(&mut self) {
        self.channel.unsubscribe();
    }
}

/// Connects to the transaction at `address`, claiming the process's single
/// attachment.
pub(crate) fn attach(
    slot: &AttachmentSlot,
    connector: &dyn TransactionConnector,
    address: &TransactionAddress,
) -> Result<Attached, TransactionError> {
    let guard = slot.claim(address)?;
    let channel = connector.connect(address)?;
    tracing::debug!(target: TRANSACTION_TARGET, %address, "attached to transaction");
    Ok(Attached {
        address: address.clone(),
        channel,
        _slot: guard,
    })
}
