//! Calls made on the daemon's bus connection.
//!
//! [`DaemonBus`] is the seam between command logic and the wire: the socket
//! implementation lives in [`socket`], and tests substitute in-memory fakes.

mod connect;
mod socket;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use sysdeploy_daemon_types::{
    CachedUpdate, Deployment, Operation, RemoteErrorKind, TransactionOptions, WatchTopic,
};
use thiserror::Error;

pub(crate) use connect::{ConnectError, connect};
pub(crate) use socket::SocketBus;

use crate::transaction::TransactionAddress;
use crate::transport::{Connection, TransportError};

pub(crate) const BUS_TARGET: &str = "sysdeploy::bus";

#[derive(Debug, Error)]
pub(crate) enum BusError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{method}: {message}")]
    Remote {
        method: &'static str,
        kind: RemoteErrorKind,
        message: String,
    },
    #[error("unexpected reply to {method}: {reply}")]
    UnexpectedReply { method: &'static str, reply: String },
    #[error("daemon closed the connection during {method}")]
    Closed { method: &'static str },
    #[error("timed out after {timeout_secs}s waiting for the daemon to reload")]
    ReloadTimeout { timeout_secs: u64 },
    #[error("failed to start notification thread: {0}")]
    Spawn(std::io::Error),
}

impl BusError {
    /// The remote end vanished before answering; the daemon was exiting.
    pub(crate) const fn is_no_reply(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                kind: RemoteErrorKind::NoReply,
                ..
            }
        )
    }
}

/// Change notifications delivered by [`DaemonBus::watch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BusNotification {
    OwnerChanged(Option<String>),
    ActiveTransactionChanged(Option<TransactionAddress>),
    /// The watch connection went away.
    Closed,
}

pub(crate) type NotificationSink = Box<dyn Fn(BusNotification) + Send>;

pub(crate) trait DaemonBus {
    /// `true` when calls are routed by the daemon's well-known name.
    fn is_addressed(&self) -> bool;

    fn register_client(&mut self, client_id: &str) -> Result<(), BusError>;

    fn active_transaction(&mut self) -> Result<Option<TransactionAddress>, BusError>;

    fn deployments(&mut self) -> Result<Vec<Deployment>, BusError>;

    fn cached_update(&mut self) -> Result<Option<CachedUpdate>, BusError>;

    /// Asks the daemon to reload and blocks until it has, or `timeout` passes.
    fn reload(&mut self, timeout: Duration) -> Result<(), BusError>;

    fn begin(
        &mut self,
        operation: Operation,
        options: TransactionOptions,
    ) -> Result<TransactionAddress, BusError>;

    /// Streams change notifications for `topic` into `sink` until the
    /// returned handle is dropped.
    fn watch(&mut self, topic: WatchTopic, sink: NotificationSink)
    -> Result<WatchHandle, BusError>;
}

/// Keeps a notification subscription alive.
///
/// Dropping the handle closes the subscription's connection and joins the
/// thread forwarding its notifications.
#[derive(Debug)]
pub(crate) struct WatchHandle {
    stop: Arc<AtomicBool>,
    connection: Option<Connection>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub(crate) const fn new(
        stop: Arc<AtomicBool>,
        connection: Connection,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            stop,
            connection: Some(connection),
            thread: Some(thread),
        }
    }

    /// A handle with nothing behind it, for buses that deliver
    /// notifications without a dedicated connection.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            connection: None,
            thread: None,
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!(target: BUS_TARGET, "notification thread panicked");
        }
    }
}
