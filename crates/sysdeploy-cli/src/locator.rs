//! Finding the transaction the daemon is currently running.
//!
//! The daemon publishes the active transaction's address before its socket
//! necessarily accepts connections, so a failed connection right after the
//! lookup is treated as a race and retried a bounded number of times.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::{BusError, DaemonBus};
use crate::transaction::{
    TransactionAddress, TransactionChannel, TransactionConnector, TransactionError,
};

const LOCATOR_TARGET: &str = "sysdeploy::locator";

/// Connection attempts made before giving up on an advertised transaction.
pub(crate) const LOCATE_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub(crate) enum LocateError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("failed to reach the active transaction after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        source: TransactionError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocatorPolicy {
    pub(crate) attempts: u32,
    pub(crate) pause: Duration,
}

impl Default for LocatorPolicy {
    fn default() -> Self {
        Self {
            attempts: LOCATE_ATTEMPTS,
            pause: Duration::from_secs(1),
        }
    }
}

/// The active transaction and an open, unstarted connection to it.
pub(crate) struct ActiveTransaction {
    pub(crate) address: TransactionAddress,
    pub(crate) channel: Box<dyn TransactionChannel>,
}

/// Returns the active transaction, or `None` when the daemon is idle.
pub(crate) fn find_active(
    bus: &mut dyn DaemonBus,
    connector: &dyn TransactionConnector,
    policy: LocatorPolicy,
) -> Result<Option<ActiveTransaction>, LocateError> {
    let Some(address) = bus.active_transaction()? else {
        debug!(target: LOCATOR_TARGET, "no active transaction");
        return Ok(None);
    };

    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match connector.connect(&address) {
            Ok(channel) => {
                debug!(target: LOCATOR_TARGET, %address, attempt, "connected to active transaction");
                return Ok(Some(ActiveTransaction { address, channel }));
            }
            Err(error) if attempt >= attempts => {
                return Err(LocateError::Unreachable {
                    attempts,
                    source: error,
                });
            }
            Err(error) => {
                warn!(target: LOCATOR_TARGET, %address, attempt, %error, "active transaction not reachable yet");
                thread::sleep(policy.pause);
                attempt += 1;
            }
        }
    }
}
