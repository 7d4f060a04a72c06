//! Opening the daemon connection and registering as a client.

use std::thread;

use camino::Utf8Path;
use sysdeploy_config::{Config, RetryPolicy};
use thiserror::Error;
use tracing::{debug, warn};

use super::{BUS_TARGET, BusError, DaemonBus, SocketBus};
use crate::session::{SessionTracker, registration_allowed};

#[derive(Debug, Error)]
pub(crate) enum ConnectError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("the daemon kept exiting while registering; gave up after {attempts} attempts")]
    RegistrationExhausted { attempts: u32 },
}

/// Opens the bus (or the anonymous peer socket when `peer` is set) for the
/// system rooted at `sysroot` and registers as a client when the caller's
/// session allows it.
pub(crate) fn connect(
    config: &Config,
    peer: bool,
    sysroot: &Utf8Path,
    sessions: &dyn SessionTracker,
    uid: u32,
) -> Result<SocketBus, ConnectError> {
    let endpoint = if peer {
        config.peer_socket()
    } else {
        config.bus_socket()
    };
    let mut bus = SocketBus::open(endpoint, sysroot.as_str())?;
    if registration_allowed(uid, sessions) {
        register_with_retry(&mut bus, config.client_id(), config.registration_policy())?;
    } else {
        debug!(target: BUS_TARGET, uid, "session is not active; skipping client registration");
    }
    Ok(bus)
}

/// Registers `client_id`, retrying while the daemon answers with no reply.
///
/// A no-reply error means the registration reached a daemon that was on its
/// way out; the next attempt activates a fresh instance. Any other error is
/// returned immediately.
pub(crate) fn register_with_retry(
    bus: &mut dyn DaemonBus,
    client_id: &str,
    policy: RetryPolicy,
) -> Result<(), ConnectError> {
    let mut attempt = 1;
    loop {
        match bus.register_client(client_id) {
            Ok(()) => {
                debug!(target: BUS_TARGET, client_id, attempt, "registered client");
                return Ok(());
            }
            Err(error) if error.is_no_reply() => {
                if attempt >= policy.attempts {
                    return Err(ConnectError::RegistrationExhausted { attempts: attempt });
                }
                warn!(target: BUS_TARGET, attempt, %error, "daemon exiting during registration; retrying");
                thread::sleep(policy.backoff);
                attempt += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }
}
