//! Calls and replies carried on the system bus connection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CachedUpdate, Deployment, Operation, TransactionOptions};

/// Well-known name owned by the daemon on addressed connections.
pub const WELL_KNOWN_NAME: &str = "org.sysdeploy.Daemon1";

/// A single call written to the bus.
///
/// `destination` is only populated on addressed connections; anonymous peer
/// connections talk to the daemon directly and leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusCall {
    /// Name the call is routed to, when the connection is addressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// The method being invoked.
    #[serde(flatten)]
    pub method: BusMethod,
}

impl BusCall {
    /// Builds a call routed to `destination`.
    #[must_use]
    pub const fn new(destination: Option<String>, method: BusMethod) -> Self {
        Self {
            destination,
            method,
        }
    }
}

/// Methods exposed by the daemon on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BusMethod {
    /// Opens the conversation and asks the bus for this connection's name.
    Hello {
        /// Root of the system the caller wants to operate on, usually `/`.
        sysroot: String,
    },
    /// Registers the caller as a client so the daemon stays alive for it.
    RegisterClient {
        /// Client identifier shown in daemon logs.
        id: String,
    },
    /// Reads the address of the transaction currently in flight.
    GetActiveTransaction,
    /// Reads the deployment list.
    GetDeployments,
    /// Reads the cached update metadata, if any.
    GetCachedUpdate,
    /// Asks the daemon to reload its view of the system.
    Reload,
    /// Starts a state-changing operation and returns its transaction address.
    Begin {
        /// Operation to perform.
        operation: Operation,
        /// Options shared by every operation.
        options: TransactionOptions,
    },
    /// Subscribes this connection to change notifications for `topic`.
    Watch {
        /// The property being watched.
        topic: WatchTopic,
    },
}

impl BusMethod {
    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::RegisterClient { .. } => "register_client",
            Self::GetActiveTransaction => "get_active_transaction",
            Self::GetDeployments => "get_deployments",
            Self::GetCachedUpdate => "get_cached_update",
            Self::Reload => "reload",
            Self::Begin { .. } => "begin",
            Self::Watch { .. } => "watch",
        }
    }
}

/// Properties that support change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchTopic {
    /// The current owner of [`WELL_KNOWN_NAME`].
    NameOwner,
    /// The active-transaction address.
    ActiveTransaction,
}

/// Replies and notifications read from the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusReply {
    /// Reply to [`BusMethod::Hello`]. `None` marks an anonymous peer.
    Hello {
        /// Unique name assigned to this connection.
        #[serde(default)]
        unique_name: Option<String>,
    },
    /// Generic success reply carrying no data.
    Ack,
    /// Reply to [`BusMethod::GetActiveTransaction`]. Empty means idle.
    ActiveTransaction {
        /// Transaction address, or the empty string.
        path: String,
    },
    /// Reply to [`BusMethod::GetDeployments`].
    Deployments {
        /// Deployments ordered with the default first.
        deployments: Vec<Deployment>,
    },
    /// Reply to [`BusMethod::GetCachedUpdate`].
    CachedUpdate {
        /// Cached update metadata, when an update check has run.
        #[serde(default)]
        update: Option<CachedUpdate>,
    },
    /// Reply to [`BusMethod::Begin`].
    Transaction {
        /// Address of the newly created transaction.
        address: String,
    },
    /// Notification: the owner of the well-known name changed.
    NameOwnerChanged {
        /// New owner, or `None` when the name was released.
        #[serde(default)]
        owner: Option<String>,
    },
    /// Notification: the active-transaction address changed.
    ActiveTransactionChanged {
        /// New address, or the empty string when idle.
        path: String,
    },
    /// The call failed on the remote side.
    Error {
        /// Error category.
        name: RemoteErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

/// Remote error categories reported by the bus or the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The peer went away before replying, typically because it was exiting.
    NoReply,
    /// The caller is not permitted to perform the call.
    AccessDenied,
    /// Nothing owns the requested name.
    ServiceUnknown,
    /// The call's arguments were rejected.
    InvalidArgs,
    /// Any other daemon-side failure.
    Failed,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoReply => "no reply",
            Self::AccessDenied => "access denied",
            Self::ServiceUnknown => "service unknown",
            Self::InvalidArgs => "invalid arguments",
            Self::Failed => "failed",
        };
        formatter.write_str(label)
    }
}
