//! Per-run context handed to command handlers.
//!
//! The daemon connection is opened lazily, on the first command that needs
//! it, and reused for the rest of the run.

use std::time::Duration;

use sysdeploy_config::Config;

use crate::bus::{self, DaemonBus};
use crate::cancel::InterruptSource;
use crate::command::DaemonOptions;
use crate::errors::CommandError;
use crate::progress::Console;
use crate::session::{LoginSessions, current_uid, effective_uid};
use crate::transaction::{AttachmentSlot, SocketConnector, TransactionConnector};

/// Environment variable that disables the root check for privileged
/// commands.
pub(crate) const SKIP_ROOT_CHECK_ENV: &str = "SYSDEPLOY_SKIP_ROOT_CHECK";

/// An open daemon connection and the means to reach its transactions.
pub(crate) struct Client {
    pub(crate) bus: Box<dyn DaemonBus>,
    pub(crate) connector: Box<dyn TransactionConnector>,
    pub(crate) slot: AttachmentSlot,
}

pub(crate) trait ClientFactory {
    fn connect(&self, config: &Config, options: &DaemonOptions) -> Result<Client, CommandError>;
}

/// Connects over the configured sockets.
pub(crate) struct SystemClients;

impl ClientFactory for SystemClients {
    fn connect(&self, config: &Config, options: &DaemonOptions) -> Result<Client, CommandError> {
        let sessions = LoginSessions::new(config.session_dir());
        let bus = bus::connect(
            config,
            options.peer,
            &options.sysroot,
            &sessions,
            current_uid(),
        )?;
        Ok(Client {
            bus: Box::new(bus),
            connector: Box::new(SocketConnector),
            slot: AttachmentSlot::default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Identity {
    pub(crate) euid: u32,
    pub(crate) skip_root_check: bool,
}

impl Identity {
    pub(crate) fn current() -> Self {
        Self {
            euid: effective_uid(),
            skip_root_check: std::env::var_os(SKIP_ROOT_CHECK_ENV).is_some(),
        }
    }

    pub(crate) const fn is_privileged(self) -> bool {
        self.skip_root_check || self.euid == 0
    }
}

/// Outside-world collaborators of a run.
#[derive(Clone, Copy)]
pub(crate) struct Services<'a> {
    pub(crate) clients: &'a dyn ClientFactory,
    pub(crate) interrupts: &'a dyn InterruptSource,
    pub(crate) identity: Identity,
}

pub(crate) struct CommandEnv<'a> {
    pub(crate) config: &'a Config,
    pub(crate) console: &'a mut dyn Console,
    services: Services<'a>,
    client: Option<Client>,
}

impl<'a> CommandEnv<'a> {
    pub(crate) fn new(
        config: &'a Config,
        console: &'a mut dyn Console,
        services: Services<'a>,
    ) -> Self {
        Self {
            config,
            console,
            services,
            client: None,
        }
    }

    pub(crate) const fn is_privileged(&self) -> bool {
        self.services.identity.is_privileged()
    }

    /// Returns the daemon session, connecting on first use.
    pub(crate) fn session(&mut self, options: &DaemonOptions) -> Result<Session<'_>, CommandError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => self.services.clients.connect(self.config, options)?,
        };
        let client = self.client.insert(client);
        Ok(Session {
            client,
            console: &mut *self.console,
            interrupts: self.services.interrupts,
            reload_timeout: self.config.reload_timeout(),
        })
    }
}

/// A connected daemon plus what a transaction wait needs.
pub(crate) struct Session<'a> {
    pub(crate) client: &'a mut Client,
    pub(crate) console: &'a mut dyn Console,
    pub(crate) interrupts: &'a dyn InterruptSource,
    pub(crate) reload_timeout: Duration,
}
